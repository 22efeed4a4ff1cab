//! Supported locales, negotiation, and message catalogs.

use once_cell::sync::Lazy;
use rocket::request::{FromRequest, Outcome, Request};
use rocket::serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

use crate::TodoApp;

pub const LOCALE_COOKIE: &str = "locale";

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(crate = "rocket::serde", rename_all = "lowercase")]
pub enum Locale {
    #[default]
    En,
    El,
    Es,
}

impl Locale {
    pub const ALL: [Locale; 3] = [Locale::En, Locale::El, Locale::Es];

    pub fn code(self) -> &'static str {
        match self {
            Locale::En => "en",
            Locale::El => "el",
            Locale::Es => "es",
        }
    }

    pub fn native_name(self) -> &'static str {
        match self {
            Locale::En => "English",
            Locale::El => "Ελληνικά",
            Locale::Es => "Español",
        }
    }

    pub fn flag(self) -> &'static str {
        match self {
            Locale::En => "🇬🇧",
            Locale::El => "🇬🇷",
            Locale::Es => "🇪🇸",
        }
    }

    pub fn from_code(code: &str) -> Option<Locale> {
        let code = code.trim();
        Locale::ALL
            .into_iter()
            .find(|locale| locale.code().eq_ignore_ascii_case(code))
    }

    pub fn messages(self) -> &'static Messages {
        &CATALOGS[&self]
    }
}

impl fmt::Display for Locale {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

/// Picks the best supported locale from an `Accept-Language` header.
///
/// Quality values are honoured, region subtags are ignored, and entries with
/// `q=0` are treated as refusals. Returns `None` when nothing matches.
pub fn negotiate(accept_language: &str) -> Option<Locale> {
    let mut ranges: Vec<(&str, f32)> = accept_language
        .split(',')
        .filter_map(|entry| {
            let mut parts = entry.split(';');
            let tag = parts.next()?.trim();
            if tag.is_empty() {
                return None;
            }
            let mut quality = 1.0;
            for param in parts {
                if let Some((key, value)) = param.split_once('=') {
                    if key.trim() == "q" {
                        quality = value.trim().parse::<f32>().ok()?.clamp(0.0, 1.0);
                    }
                }
            }
            Some((tag, quality))
        })
        .filter(|(_, quality)| *quality > 0.0)
        .collect();

    // Stable sort keeps header order among equal qualities.
    ranges.sort_by(|a, b| b.1.total_cmp(&a.1));

    ranges.into_iter().find_map(|(tag, _)| {
        let primary = tag.split(['-', '_']).next().unwrap_or(tag);
        Locale::from_code(primary)
    })
}

/// The locale a request prefers: the `locale` cookie, then `Accept-Language`,
/// then the configured default.
pub struct RequestLocale(pub Locale);

#[rocket::async_trait]
impl<'r> FromRequest<'r> for RequestLocale {
    type Error = ();

    async fn from_request(req: &'r Request<'_>) -> Outcome<Self, Self::Error> {
        let from_cookie = req
            .cookies()
            .get(LOCALE_COOKIE)
            .and_then(|cookie| Locale::from_code(cookie.value()));
        let from_header = || {
            req.headers()
                .get_one("Accept-Language")
                .and_then(negotiate)
        };
        let fallback = || {
            req.rocket()
                .state::<TodoApp>()
                .map(|app| app.config.default_locale)
                .unwrap_or_default()
        };

        let locale = from_cookie.or_else(from_header).unwrap_or_else(fallback);
        Outcome::Success(RequestLocale(locale))
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(crate = "rocket::serde")]
pub struct Messages {
    #[serde(rename = "HomePage")]
    pub home_page: HomePageMessages,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(crate = "rocket::serde")]
pub struct HomePageMessages {
    pub title: String,
    pub description: String,
    pub components: ComponentMessages,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(crate = "rocket::serde")]
pub struct ComponentMessages {
    pub title: String,
    pub input: String,
    pub button: String,
}

#[derive(Serialize, Debug, Clone)]
#[serde(crate = "rocket::serde")]
pub struct Language {
    pub code: &'static str,
    pub name: &'static str,
    pub flag: &'static str,
}

pub fn languages() -> Vec<Language> {
    Locale::ALL
        .into_iter()
        .map(|locale| Language {
            code: locale.code(),
            name: locale.native_name(),
            flag: locale.flag(),
        })
        .collect()
}

static CATALOGS: Lazy<HashMap<Locale, Messages>> = Lazy::new(|| {
    let sources = [
        (Locale::En, include_str!("../messages/en.json")),
        (Locale::El, include_str!("../messages/el.json")),
        (Locale::Es, include_str!("../messages/es.json")),
    ];
    sources
        .into_iter()
        .map(|(locale, source)| {
            let messages = serde_json::from_str(source)
                .unwrap_or_else(|e| panic!("invalid message catalog for {locale}: {e}"));
            (locale, messages)
        })
        .collect()
});
