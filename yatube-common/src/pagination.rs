//! Splitting an ordered listing into fixed-size pages.
//!
//! Page selection is forgiving: a missing or unparsable page number shows the
//! first page and a number outside the valid range shows the last one, so a
//! stale `?page=` link never fails.

use serde::Serialize;

pub const POSTS_ON_PAGE: u32 = 10;

#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Debug, Hash)]
pub struct Paginator {
    count: u64,
    per_page: u32,
}

/// 1-based page index already clamped to a paginator's range.
#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Debug, Hash)]
pub struct PageNumber {
    number: u64,
    per_page: u32,
}

impl Paginator {
    /// `per_page` of zero is treated as one.
    #[must_use]
    pub fn new(count: u64, per_page: u32) -> Self {
        Self {
            count,
            per_page: per_page.max(1),
        }
    }

    /// At least one, even for an empty listing.
    #[must_use]
    pub fn num_pages(self) -> u64 {
        self.count.div_ceil(u64::from(self.per_page)).max(1)
    }

    #[must_use]
    pub fn resolve(self, page: Option<&str>) -> PageNumber {
        let number = match page.map(str::trim) {
            None => 1,
            Some(page) => match page.parse::<i128>() {
                Ok(number) => u64::try_from(number)
                    .ok()
                    .filter(|number| (1..=self.num_pages()).contains(number))
                    .unwrap_or_else(|| self.num_pages()),
                // Too many digits to parse, still out of range.
                Err(_) if is_integer(page) => self.num_pages(),
                Err(_) => 1,
            },
        };

        PageNumber {
            number,
            per_page: self.per_page,
        }
    }

    #[must_use]
    pub fn page<T>(self, number: PageNumber, object_list: Vec<T>) -> Page<T> {
        let num_pages = self.num_pages();

        Page {
            object_list,
            number: number.number,
            num_pages,
            count: self.count,
            has_next: number.number < num_pages,
            has_previous: number.number > 1,
        }
    }
}

fn is_integer(value: &str) -> bool {
    let digits = value.strip_prefix(['+', '-']).unwrap_or(value);
    !digits.is_empty() && digits.bytes().all(|b| b.is_ascii_digit())
}

impl PageNumber {
    #[must_use]
    pub fn get(self) -> u64 {
        self.number
    }

    #[must_use]
    pub fn limit(self) -> u32 {
        self.per_page
    }

    #[must_use]
    pub fn offset(self) -> u64 {
        (self.number - 1) * u64::from(self.per_page)
    }
}

#[derive(Clone, Eq, PartialEq, Debug, Hash, Serialize)]
pub struct Page<T> {
    pub object_list: Vec<T>,
    pub number: u64,
    pub num_pages: u64,
    pub count: u64,
    pub has_next: bool,
    pub has_previous: bool,
}

impl<T> Page<T> {
    #[must_use]
    pub fn len(&self) -> usize {
        self.object_list.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.object_list.is_empty()
    }
}
