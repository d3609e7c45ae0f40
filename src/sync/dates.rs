//! Date normalization for synced documents.
//!
//! Scraped dates are relative ("3 weeks ago", "hace 2 meses") and in
//! whatever language the page was rendered in. They are resolved against
//! the current time with coarse units: a month is 30 days and a year 365.

use std::sync::LazyLock;

use chrono::{DateTime, Duration, SecondsFormat, Utc};
use regex::Regex;

use crate::models::ReviewDocument;

/// Larger amounts are not relative review dates.
const MAX_AMOUNT: i64 = 10_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Unit {
    Minute,
    Hour,
    Day,
    Week,
    Month,
    Year,
}

impl Unit {
    fn duration(self, amount: i64) -> Duration {
        match self {
            Unit::Minute => Duration::minutes(amount),
            Unit::Hour => Duration::hours(amount),
            Unit::Day => Duration::days(amount),
            Unit::Week => Duration::weeks(amount),
            Unit::Month => Duration::days(30 * amount),
            Unit::Year => Duration::days(365 * amount),
        }
    }
}

const YEAR_WORDS: &[&str] = &[
    "year", "years", "tahun", "año", "años", "an", "ans", "année", "années", "jahr", "jahre",
    "jahren", "anno", "anni", "ano", "anos", "год", "года", "лет", "년", "年", "سنة", "سنوات",
    "साल", "वर्ष", "yıl", "jaar", "jaren", "rok", "lat", "lata", "roku", "năm", "år", "vuosi",
    "vuotta", "χρόνο", "χρόνια", "έτος", "έτη", "roky", "let", "lety", "ani", "év", "éve", "évet",
    "ปี", "שנה", "שנים", "година", "години",
];

const MONTH_WORDS: &[&str] = &[
    "month", "months", "bulan", "mes", "meses", "mois", "monat", "monate", "monaten", "mese",
    "mesi", "mês", "месяц", "месяца", "месяцев", "개월", "か月", "ヶ月", "ケ月", "个月", "個月",
    "شهر", "أشهر", "شهور", "महीना", "महीने", "ay", "maand", "maanden", "miesiąc", "miesiące",
    "miesięcy", "tháng", "månad", "månader", "måned", "måneder", "kuukausi", "kuukautta", "μήνα",
    "μήνες", "měsíc", "měsíce", "měsíců", "měsíci", "lună", "luni", "hónap", "hónapja", "เดือน",
    "חודש", "חודשים", "месец", "месеца",
];

const WEEK_WORDS: &[&str] = &[
    "week", "weeks", "minggu", "semana", "semanas", "semaine", "semaines", "woche", "wochen",
    "settimana", "settimane", "неделя", "недели", "недель", "주", "週間", "週", "周", "أسبوع",
    "أسابيع", "हफ्ता", "हफ्ते", "सप्ताह", "hafta", "weken", "tydzień", "tygodnie", "tygodni",
    "tuần", "vecka", "veckor", "uke", "uker", "uge", "uger", "viikko", "viikkoa", "εβδομάδα",
    "εβδομάδες", "týden", "týdny", "týdnů", "săptămână", "săptămâni", "hét", "hete", "สัปดาห์",
    "שבוע", "שבועות", "седмица", "седмици",
];

const DAY_WORDS: &[&str] = &[
    "day", "days", "hari", "día", "días", "jour", "jours", "tag", "tage", "tagen", "giorno",
    "giorni", "dia", "dias", "день", "дня", "дней", "일", "日", "يوم", "أيام", "दिन", "gün",
    "dag", "dagen", "dagar", "dzień", "dni", "ngày", "päivä", "päivää", "ημέρα", "ημέρες",
    "μέρα", "μέρες", "den", "dny", "dnů", "dní", "zi", "zile", "nap", "napja", "วัน", "יום",
    "ימים", "ден", "дни",
];

const HOUR_WORDS: &[&str] = &[
    "hour", "hours", "jam", "hora", "horas", "heure", "heures", "stunde", "stunden", "ora", "ore",
    "час", "часа", "часов", "시간", "時間", "小时", "小時", "ساعة", "ساعات", "घंटा", "घंटे",
    "saat", "uur", "godzina", "godziny", "godzin", "giờ", "timme", "timmar", "time", "timer",
    "tunti", "tuntia", "ώρα", "ώρες", "hodina", "hodiny", "hodin", "óra", "órája", "ชั่วโมง",
    "שעה", "שעות",
];

const MINUTE_WORDS: &[&str] = &[
    "minute", "minutes", "menit", "minuto", "minutos", "minuten", "minuti", "минута", "минуты",
    "минут", "минути", "분", "分", "دقيقة", "دقائق", "मिनट", "dakika", "minuta", "minuty",
    "minut", "phút", "minuter", "minutt", "minutter", "minuutti", "minuuttia", "λεπτό", "λεπτά",
    "perc", "perce", "นาที", "דקה", "דקות",
];

/// Words that encode both the unit and an amount of two.
const DUAL_FORMS: &[(&str, Unit)] = &[
    ("שנתיים", Unit::Year),
    ("חודשיים", Unit::Month),
    ("שבועיים", Unit::Week),
    ("יומיים", Unit::Day),
    ("שעתיים", Unit::Hour),
    ("سنتين", Unit::Year),
    ("شهرين", Unit::Month),
    ("أسبوعين", Unit::Week),
    ("يومين", Unit::Day),
    ("ساعتين", Unit::Hour),
];

/// Every unit keyword, longest first so "months" wins over "mes".
static KEYWORDS: LazyLock<Vec<(String, Unit)>> = LazyLock::new(|| {
    let groups: [(&[&str], Unit); 6] = [
        (YEAR_WORDS, Unit::Year),
        (MONTH_WORDS, Unit::Month),
        (WEEK_WORDS, Unit::Week),
        (DAY_WORDS, Unit::Day),
        (HOUR_WORDS, Unit::Hour),
        (MINUTE_WORDS, Unit::Minute),
    ];
    let mut keywords: Vec<(String, Unit)> = groups
        .iter()
        .flat_map(|(words, unit)| words.iter().map(move |w| (w.to_lowercase(), *unit)))
        .collect();
    keywords.sort_by_key(|(word, _)| std::cmp::Reverse(word.chars().count()));
    keywords
});

static NUMBER: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\d+").unwrap());

/// Resolve a relative date phrase against `now`. Amounts default to one
/// ("a year ago", "il y a un an").
pub fn parse_relative_date(text: &str, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
    let text = text.trim().to_lowercase();
    if text.is_empty() {
        return None;
    }

    if let Some((_, unit)) = DUAL_FORMS.iter().find(|(word, _)| text.contains(word)) {
        return now.checked_sub_signed(unit.duration(2));
    }

    let amount = match NUMBER.find(&text) {
        Some(m) => m.as_str().parse::<i64>().ok()?,
        None => 1,
    };
    if amount > MAX_AMOUNT {
        return None;
    }

    let (_, unit) = KEYWORDS.iter().find(|(word, _)| text.contains(word.as_str()))?;
    now.checked_sub_signed(unit.duration(amount))
}

/// Normalize one date value to RFC 3339 UTC. Absolute dates are
/// reformatted, relative phrases resolved, anything else left untouched.
pub fn normalize_date(value: &str, now: DateTime<Utc>) -> String {
    if value.is_empty() {
        return String::new();
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(value) {
        return dt.with_timezone(&Utc).to_rfc3339_opts(SecondsFormat::Secs, true);
    }
    match parse_relative_date(value, now) {
        Some(dt) => dt.to_rfc3339_opts(SecondsFormat::Secs, true),
        None => value.to_string(),
    }
}

/// Normalize the date fields of every document in place.
pub fn normalize_documents(documents: &mut [ReviewDocument], now: DateTime<Utc>) {
    for doc in documents {
        doc.review_date = normalize_date(&doc.review_date, now);
        doc.created_date = normalize_date(&doc.created_date, now);
        doc.last_modified_date = normalize_date(&doc.last_modified_date, now);
    }
}
