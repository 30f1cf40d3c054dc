// Copyright 2023 Remi Bernotavicius

use crate::{Error, Result};
use serde::Serialize;

#[derive(Serialize, Debug)]
pub struct Page<T> {
    pub count: i64,
    pub next: Option<String>,
    pub previous: Option<String>,
    pub results: Vec<T>,
}

/// `path?query` with the given parameters replaced, others kept in order.
fn link(path: &str, params: &[(String, String)], overrides: &[(&str, i64)]) -> String {
    let mut query = url::form_urlencoded::Serializer::new(String::new());
    for (key, value) in params {
        if !overrides.iter().any(|(o, _)| *o == key.as_str()) {
            query.append_pair(key, value);
        }
    }
    for (key, value) in overrides {
        query.append_pair(key, &value.to_string());
    }
    format!("{path}?{}", query.finish())
}

fn parse_positive(name: &str, value: &str) -> Result<i64> {
    match value.trim().parse::<i64>() {
        Ok(v) if v >= 1 => Ok(v),
        _ => Err(Error::validation(format!(
            "{name}: expected a positive integer, got {value:?}"
        ))),
    }
}

fn parse_non_negative(name: &str, value: &str) -> Result<i64> {
    match value.trim().parse::<i64>() {
        Ok(v) if v >= 0 => Ok(v),
        _ => Err(Error::validation(format!(
            "{name}: expected a non-negative integer, got {value:?}"
        ))),
    }
}

/// Page-number pagination, `?page=N&limit=M` (`page_size` is accepted for `limit`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageNumber {
    pub page: i64,
    pub size: i64,
}

impl PageNumber {
    pub fn from_params(page: Option<&str>, limit: Option<&str>, default_size: i64) -> Result<Self> {
        Ok(Self {
            page: page.map(|p| parse_positive("page", p)).transpose()?.unwrap_or(1),
            size: limit
                .map(|l| parse_positive("limit", l))
                .transpose()?
                .unwrap_or(default_size),
        })
    }

    /// Saturates, so a huge page number lands past the end instead of wrapping.
    pub fn offset(&self) -> i64 {
        (self.page - 1).saturating_mul(self.size)
    }

    /// Pages past the end are an error, except the first page of an empty set.
    pub fn check_in_range(&self, count: i64) -> Result<()> {
        if self.page > 1 && self.offset() >= count {
            return Err(Error::NotFound("page"));
        }
        Ok(())
    }

    pub fn has_next(&self, count: i64) -> bool {
        self.page
            .checked_mul(self.size)
            .is_some_and(|end| end < count)
    }

    pub fn has_previous(&self) -> bool {
        self.page > 1
    }

    pub fn page<T>(
        &self,
        path: &str,
        params: &[(String, String)],
        count: i64,
        results: Vec<T>,
    ) -> Page<T> {
        Page {
            count,
            next: self
                .has_next(count)
                .then(|| link(path, params, &[("page", self.page + 1)])),
            previous: self
                .has_previous()
                .then(|| link(path, params, &[("page", self.page - 1)])),
            results,
        }
    }
}

/// Limit/offset pagination, `?limit=N&offset=M`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LimitOffset {
    pub limit: i64,
    pub offset: i64,
}

impl LimitOffset {
    pub fn from_params(limit: Option<&str>, offset: Option<&str>, default_limit: i64) -> Result<Self> {
        Ok(Self {
            limit: limit
                .map(|l| parse_positive("limit", l))
                .transpose()?
                .unwrap_or(default_limit),
            offset: offset
                .map(|o| parse_non_negative("offset", o))
                .transpose()?
                .unwrap_or(0),
        })
    }

    pub fn next_offset(&self, count: i64) -> Option<i64> {
        self.offset
            .checked_add(self.limit)
            .filter(|&next| next < count)
    }

    pub fn previous_offset(&self) -> Option<i64> {
        (self.offset > 0).then(|| (self.offset - self.limit).max(0))
    }

    pub fn page<T>(
        &self,
        path: &str,
        params: &[(String, String)],
        count: i64,
        results: Vec<T>,
    ) -> Page<T> {
        let at = |offset| link(path, params, &[("limit", self.limit), ("offset", offset)]);
        Page {
            count,
            next: self.next_offset(count).map(at),
            previous: self.previous_offset().map(at),
            results,
        }
    }
}

#[test]
fn page_number_defaults_and_bounds() {
    let p = PageNumber::from_params(None, None, 6).unwrap();
    assert_eq!(p, PageNumber { page: 1, size: 6 });
    assert_eq!(p.offset(), 0);
    assert!(p.check_in_range(0).is_ok());

    let p = PageNumber::from_params(Some("3"), Some("2"), 6).unwrap();
    assert_eq!(p.offset(), 4);
    assert!(p.check_in_range(5).is_ok());
    assert!(!p.has_next(6));
    assert!(p.has_next(7));
    assert!(matches!(p.check_in_range(4), Err(Error::NotFound(_))));

    assert!(PageNumber::from_params(Some("0"), None, 6).is_err());
    assert!(PageNumber::from_params(None, Some("x"), 6).is_err());
}

#[test]
fn huge_page_numbers_are_past_the_end() {
    let p = PageNumber::from_params(Some("9223372036854775807"), Some("2"), 6).unwrap();
    assert_eq!(p.offset(), i64::MAX);
    assert!(!p.has_next(10));
    assert!(matches!(p.check_in_range(10), Err(Error::NotFound("page"))));

    let p = PageNumber::from_params(None, Some("9223372036854775807"), 6).unwrap();
    assert_eq!(p.offset(), 0);
    assert!(!p.has_next(10));
    assert!(p.check_in_range(10).is_ok());
}

#[test]
fn huge_limits_have_no_next_page() {
    let lo = LimitOffset::from_params(Some("9223372036854775807"), Some("1"), 10).unwrap();
    assert_eq!(lo.next_offset(10), None);
    assert_eq!(lo.previous_offset(), Some(0));
    let page = lo.page("/api/users/", &[], 10, vec![(); 9]);
    assert_eq!(page.next, None);
    assert_eq!(
        page.previous.as_deref(),
        Some("/api/users/?limit=9223372036854775807&offset=0")
    );
}

#[test]
fn limit_offset_links() {
    let lo = LimitOffset::from_params(Some("2"), Some("3"), 10).unwrap();
    assert_eq!(lo.next_offset(10), Some(5));
    assert_eq!(lo.next_offset(5), None);
    assert_eq!(lo.previous_offset(), Some(1));

    let lo = LimitOffset::from_params(None, None, 10).unwrap();
    assert_eq!(lo, LimitOffset { limit: 10, offset: 0 });
    assert_eq!(lo.previous_offset(), None);
    assert!(LimitOffset::from_params(None, Some("-1"), 10).is_err());
}

#[test]
fn links_keep_other_params() {
    let params = vec![
        ("tags".to_owned(), "lunch".to_owned()),
        ("page".to_owned(), "2".to_owned()),
        ("tags".to_owned(), "dinner & more".to_owned()),
    ];
    let page = PageNumber { page: 2, size: 1 }.page("/api/recipes/", &params, 3, vec![()]);
    assert_eq!(
        page.next.as_deref(),
        Some("/api/recipes/?tags=lunch&tags=dinner+%26+more&page=3")
    );
    assert_eq!(
        page.previous.as_deref(),
        Some("/api/recipes/?tags=lunch&tags=dinner+%26+more&page=1")
    );

    let page = LimitOffset { limit: 2, offset: 0 }.page("/api/users/", &[], 3, vec![(), ()]);
    assert_eq!(page.next.as_deref(), Some("/api/users/?limit=2&offset=2"));
    assert_eq!(page.previous, None);
}
