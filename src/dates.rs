use chrono::{
    DateTime, Datelike, FixedOffset, Local, LocalResult, NaiveDate, NaiveTime, TimeZone,
};
use chrono_tz::Tz;
use once_cell::sync::Lazy;
use regex::{Captures, Regex};
use unicode_normalization::{char::is_combining_mark, UnicodeNormalization};

const MONTHS: &[(&str, u32)] = &[
    ("enero", 1),
    ("febrero", 2),
    ("marzo", 3),
    ("abril", 4),
    ("mayo", 5),
    ("junio", 6),
    ("julio", 7),
    ("agosto", 8),
    ("septiembre", 9),
    ("setiembre", 9),
    ("octubre", 10),
    ("noviembre", 11),
    ("diciembre", 12),
    ("ene", 1),
    ("feb", 2),
    ("mar", 3),
    ("abr", 4),
    ("may", 5),
    ("jun", 6),
    ("jul", 7),
    ("ago", 8),
    ("sept", 9),
    ("sep", 9),
    ("oct", 10),
    ("nov", 11),
    ("dic", 12),
];

const MONTH_RANGE_END_DAY: u32 = 28;

// Range separator: a hyphen, or "al"/"a" between words.
const SEP: &str = r"(?:\s*-\s*|\s+al?\s+)";

// Longest names first so "sep" never shadows "septiembre"; an abbreviation
// may carry a trailing period.
static MONTH_ALT: Lazy<String> = Lazy::new(|| {
    let mut names: Vec<&str> = MONTHS.iter().map(|(name, _)| *name).collect();
    names.sort_by_key(|name| std::cmp::Reverse(name.len()));
    format!(r"({})\b\.?", names.join("|"))
});

static DASH_RUN_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"-{2,}").expect("dash run regex"));
static DAY_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\d{1,2}").expect("day regex"));

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DateRange {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl DateRange {
    pub fn single(day: NaiveDate) -> Self {
        DateRange {
            start: day,
            end: day,
        }
    }
}

pub struct DateMatcher {
    pub name: &'static str,
    regex: Regex,
    resolve: fn(&Captures<'_>, i32) -> Option<DateRange>,
}

impl DateMatcher {
    fn new(
        name: &'static str,
        pattern: &str,
        resolve: fn(&Captures<'_>, i32) -> Option<DateRange>,
    ) -> Self {
        let regex = Regex::new(pattern).unwrap_or_else(|err| panic!("{name} regex: {err}"));
        DateMatcher {
            name,
            regex,
            resolve,
        }
    }

    pub fn try_match(&self, normalized: &str, fallback_year: i32) -> Option<DateRange> {
        self.regex
            .captures_iter(normalized)
            .find_map(|caps| (self.resolve)(&caps, fallback_year))
    }
}

static MATCHERS: Lazy<Vec<DateMatcher>> = Lazy::new(|| {
    let m = MONTH_ALT.as_str();
    vec![
        DateMatcher::new(
            "numeric_range",
            &format!(
                r"\b(\d{{1,2}})[/.](\d{{1,2}})(?:[/.](\d{{2,4}}))?{SEP}(\d{{1,2}})[/.](\d{{1,2}})(?:[/.](\d{{2,4}}))?\b"
            ),
            resolve_numeric_range,
        ),
        DateMatcher::new(
            "day_month_range",
            &format!(
                r"\b(\d{{1,2}})\s+(?:de\s+)?{m}(?:\s+(?:de\s+)?(\d{{4}}))?{SEP}(\d{{1,2}})\s+(?:de\s+)?{m}(?:\s+(?:de\s+)?(\d{{4}}))?"
            ),
            resolve_day_month_range,
        ),
        DateMatcher::new(
            "days_of_month_range",
            &format!(r"\b(\d{{1,2}}){SEP}(\d{{1,2}})\s+(?:de\s+)?{m}(?:\s+(?:de\s+)?(\d{{4}}))?"),
            resolve_days_of_month_range,
        ),
        DateMatcher::new(
            "month_range",
            &format!(r"\b{m}(?:\s+(?:de\s+)?(\d{{4}}))?{SEP}{m}\s+(?:de\s+)?(\d{{4}})"),
            resolve_month_range,
        ),
        DateMatcher::new(
            "day_list",
            &format!(
                r"\b(\d{{1,2}}(?:(?:\s*,|\s+y)\s*\d{{1,2}})+)\s+(?:de\s+)?{m}(?:\s+(?:de\s+)?(\d{{4}}))?"
            ),
            resolve_day_list,
        ),
        DateMatcher::new(
            "single_day",
            &format!(r"\b(\d{{1,2}})\s+(?:de\s+)?{m}(?:\s+(?:de\s+)?(\d{{4}}))?"),
            resolve_single_day,
        ),
        DateMatcher::new(
            "numeric_single",
            r"\b(\d{1,2})[/.](\d{1,2})[/.](\d{4})\b",
            resolve_numeric_single,
        ),
    ]
});

pub fn matchers() -> &'static [DateMatcher] {
    &MATCHERS
}

/// NFKD, combining marks dropped, unicode dashes folded to `-`, lower-cased,
/// whitespace collapsed.
pub fn normalize_text(input: &str) -> String {
    let mut folded = String::with_capacity(input.len());
    for ch in input.nfkd() {
        match ch {
            c if is_combining_mark(c) => {}
            '\u{2010}'..='\u{2015}' | '\u{2212}' => folded.push('-'),
            _ => folded.extend(ch.to_lowercase()),
        }
    }
    let collapsed = DASH_RUN_RE.replace_all(&folded, "-");
    collapsed.split_whitespace().collect::<Vec<_>>().join(" ")
}

pub fn current_year() -> i32 {
    Local::now().year()
}

pub fn parse_date_range(text: &str) -> (Option<NaiveDate>, Option<NaiveDate>) {
    parse_date_range_with_year(text, current_year())
}

pub fn parse_date_range_with_year(
    text: &str,
    fallback_year: i32,
) -> (Option<NaiveDate>, Option<NaiveDate>) {
    match find_date_range(text, fallback_year) {
        Some(range) => (Some(range.start), Some(range.end)),
        None => (None, None),
    }
}

pub fn find_date_range(text: &str, fallback_year: i32) -> Option<DateRange> {
    let normalized = normalize_text(text);
    if normalized.is_empty() {
        return None;
    }
    matchers()
        .iter()
        .find_map(|matcher| matcher.try_match(&normalized, fallback_year))
}

pub fn parse_calendar_date(text: &str) -> Option<NaiveDate> {
    let trimmed = text.trim();
    if let Some(iso) = trimmed.get(..10) {
        if let Ok(date) = NaiveDate::parse_from_str(iso, "%Y-%m-%d") {
            return Some(date);
        }
    }
    let normalized = normalize_text(trimmed);
    MATCHERS
        .iter()
        .find(|matcher| matcher.name == "numeric_single")
        .and_then(|matcher| matcher.try_match(&normalized, current_year()))
        .map(|range| range.start)
}

/// Tabular listings put start and end in separate cells; an absent or
/// unreadable end cell makes it a single-day event.
pub fn parse_tabular_pair(
    start_text: &str,
    end_text: Option<&str>,
) -> (Option<NaiveDate>, Option<NaiveDate>) {
    let Some(start) = parse_calendar_date(start_text) else {
        return (None, None);
    };
    let end = end_text.and_then(parse_calendar_date).unwrap_or(start);
    (Some(start), Some(end))
}

pub fn local_datetime(
    date: NaiveDate,
    hour: u32,
    minute: u32,
    tz: Tz,
) -> Option<DateTime<FixedOffset>> {
    let naive = date.and_time(NaiveTime::from_hms_opt(hour, minute, 0)?);
    match tz.from_local_datetime(&naive) {
        LocalResult::Single(dt) => Some(dt.fixed_offset()),
        LocalResult::Ambiguous(dt, _) => Some(dt.fixed_offset()),
        LocalResult::None => None,
    }
}

pub fn all_day(
    start: Option<NaiveDate>,
    end: Option<NaiveDate>,
    tz: Tz,
) -> (Option<DateTime<FixedOffset>>, Option<DateTime<FixedOffset>>) {
    (
        start.and_then(|d| local_datetime(d, 0, 0, tz)),
        end.and_then(|d| local_datetime(d, 23, 59, tz)),
    )
}

pub fn overlaps(
    start: Option<NaiveDate>,
    end: Option<NaiveDate>,
    window_start: NaiveDate,
    window_end: NaiveDate,
) -> bool {
    let (start, end) = match (start, end) {
        (None, None) => return false,
        (Some(s), None) => (s, s),
        (None, Some(e)) => (e, e),
        (Some(s), Some(e)) => (s, e),
    };
    start <= window_end && end >= window_start
}

fn month_number(name: &str) -> Option<u32> {
    MONTHS
        .iter()
        .find(|(candidate, _)| *candidate == name)
        .map(|(_, number)| *number)
}

fn num<T: std::str::FromStr>(caps: &Captures<'_>, index: usize) -> Option<T> {
    caps.get(index)?.as_str().parse().ok()
}

fn year(caps: &Captures<'_>, index: usize) -> Option<i32> {
    let value: i32 = num(caps, index)?;
    Some(if value < 100 { 2000 + value } else { value })
}

fn month(caps: &Captures<'_>, index: usize) -> Option<u32> {
    month_number(caps.get(index)?.as_str())
}

/// Builds a range whose years may have been inferred. When only the end year
/// is known and the start would land after the end, the range crosses New
/// Year ("del 20 de diciembre al 10 de enero de 2026").
fn ranged(
    (d1, m1, y1): (u32, u32, Option<i32>),
    (d2, m2, y2): (u32, u32, Option<i32>),
    fallback_year: i32,
) -> Option<DateRange> {
    let end_year = y2.or(y1).unwrap_or(fallback_year);
    let start_year = y1.unwrap_or(end_year);
    let end = NaiveDate::from_ymd_opt(end_year, m2, d2)?;
    let mut start = NaiveDate::from_ymd_opt(start_year, m1, d1)?;
    if start > end && y1.is_none() {
        start = NaiveDate::from_ymd_opt(start_year - 1, m1, d1)?;
    }
    Some(DateRange { start, end })
}

fn resolve_numeric_range(caps: &Captures<'_>, fallback_year: i32) -> Option<DateRange> {
    ranged(
        (num(caps, 1)?, num(caps, 2)?, year(caps, 3)),
        (num(caps, 4)?, num(caps, 5)?, year(caps, 6)),
        fallback_year,
    )
}

fn resolve_day_month_range(caps: &Captures<'_>, fallback_year: i32) -> Option<DateRange> {
    ranged(
        (num(caps, 1)?, month(caps, 2)?, year(caps, 3)),
        (num(caps, 4)?, month(caps, 5)?, year(caps, 6)),
        fallback_year,
    )
}

fn resolve_days_of_month_range(caps: &Captures<'_>, fallback_year: i32) -> Option<DateRange> {
    let m = month(caps, 3)?;
    let y = year(caps, 4);
    ranged((num(caps, 1)?, m, y), (num(caps, 2)?, m, y), fallback_year)
}

fn resolve_month_range(caps: &Captures<'_>, fallback_year: i32) -> Option<DateRange> {
    ranged(
        (1, month(caps, 1)?, year(caps, 2)),
        (MONTH_RANGE_END_DAY, month(caps, 3)?, year(caps, 4)),
        fallback_year,
    )
}

fn resolve_day_list(caps: &Captures<'_>, fallback_year: i32) -> Option<DateRange> {
    let days: Vec<u32> = DAY_RE
        .find_iter(caps.get(1)?.as_str())
        .filter_map(|m| m.as_str().parse().ok())
        .collect();
    let first = *days.iter().min()?;
    let last = *days.iter().max()?;
    let m = month(caps, 2)?;
    let y = year(caps, 3).unwrap_or(fallback_year);
    Some(DateRange {
        start: NaiveDate::from_ymd_opt(y, m, first)?,
        end: NaiveDate::from_ymd_opt(y, m, last)?,
    })
}

fn resolve_single_day(caps: &Captures<'_>, fallback_year: i32) -> Option<DateRange> {
    let y = year(caps, 3).unwrap_or(fallback_year);
    NaiveDate::from_ymd_opt(y, month(caps, 2)?, num(caps, 1)?).map(DateRange::single)
}

fn resolve_numeric_single(caps: &Captures<'_>, _fallback_year: i32) -> Option<DateRange> {
    NaiveDate::from_ymd_opt(year(caps, 3)?, num(caps, 2)?, num(caps, 1)?).map(DateRange::single)
}
