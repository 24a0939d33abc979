//! Title lookup on the catalog search page.

use crate::{Error, Result, error::snippet, utils};
use log::debug;
use reqwest::blocking::{Client, Request};
use scraper::{ElementRef, Html, Selector};
use std::sync::LazyLock;

static FILM: LazyLock<Selector> = LazyLock::new(|| Selector::parse("div.film").unwrap());
static HEADING: LazyLock<Selector> = LazyLock::new(|| Selector::parse("h2").unwrap());
static SHOWING: LazyLock<Selector> = LazyLock::new(|| Selector::parse("p.film-showing").unwrap());
static LINK: LazyLock<Selector> = LazyLock::new(|| Selector::parse("a[href]").unwrap());

/// Search result, or a bare film id given on the command line.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Title {
    pub id: String,
    pub name: String,
    pub year: Option<String>,
    /// Upper case country codes, empty when unknown.
    pub countries: Vec<String>,
    pub slug: Option<String>,
}

impl Title {
    pub fn from_id(id: &str) -> Self {
        Self {
            id: id.to_owned(),
            name: format!("film-{}", id),
            ..Default::default()
        }
    }

    /// `<name> (<year>)`, or just the name when the year is unknown.
    pub fn full_title(&self) -> String {
        match &self.year {
            Some(year) => format!("{} ({})", self.name, year),
            None => self.name.clone(),
        }
    }

    /// Full title made safe for use as a file name.
    pub fn file_name(&self) -> String {
        utils::sanitize_filename(&self.full_title())
    }

    pub fn url(&self) -> Option<String> {
        self.slug
            .as_ref()
            .map(|x| format!("https://mubi.com/films/{}", x))
    }

    /// Titles with no known country list are assumed available.
    pub fn is_available_in(&self, country: &str) -> bool {
        self.countries.is_empty()
            || self
                .countries
                .iter()
                .any(|x| x.eq_ignore_ascii_case(country))
    }

    pub fn check_region(&self, country: &str) -> Result<()> {
        if self.is_available_in(country) {
            Ok(())
        } else {
            Err(Error::RegionRestricted {
                title: self.full_title(),
                country: country.to_owned(),
            })
        }
    }
}

/// First result of a search page.
pub fn parse_search_page(html: &str) -> Option<Title> {
    let document = Html::parse_document(html);
    let film = document.select(&FILM).next()?;
    let id = attr(&film, "data-id")?;
    let name = film
        .select(&HEADING)
        .next()
        .map(|x| x.text().collect::<String>().trim().to_owned())
        .filter(|x| !x.is_empty())?;

    let countries = film
        .select(&SHOWING)
        .next()
        .map(|x| {
            x.text()
                .collect::<String>()
                .split(',')
                .map(|y| y.trim().to_uppercase())
                .filter(|y| !y.is_empty())
                .collect()
        })
        .unwrap_or_default();

    let slug = film
        .select(&LINK)
        .next()
        .and_then(|x| x.value().attr("href"))
        .and_then(|x| x.trim_end_matches('/').rsplit('/').next())
        .filter(|x| !x.is_empty())
        .map(|x| x.to_owned());

    Some(Title {
        id,
        name,
        year: attr(&film, "data-year"),
        countries,
        slug,
    })
}

fn attr(element: &ElementRef, name: &str) -> Option<String> {
    element
        .value()
        .attr(name)
        .map(|x| x.trim().to_owned())
        .filter(|x| !x.is_empty())
}

/// Numeric arguments are film ids, anything else is a search query.
pub fn is_film_id(query: &str) -> bool {
    !query.is_empty() && query.chars().all(|x| x.is_ascii_digit())
}

pub struct TitleSearch {
    client: Client,
    url: String,
}

impl TitleSearch {
    pub fn new(client: Client, url: impl Into<String>) -> Self {
        Self {
            client,
            url: url.into(),
        }
    }

    fn request(&self, query: &str) -> reqwest::Result<Request> {
        self.client
            .get(&self.url)
            .query(&[("q", query.trim())])
            .build()
    }

    pub fn search(&self, query: &str) -> Result<Option<Title>> {
        let request = self.request(query)?;
        debug!("GET {}", request.url());
        let response = self.client.execute(request)?;
        let status = response.status();
        let body = response.text()?;

        if !status.is_success() {
            debug!("search page responded ({}): {}", status, snippet(&body));
            return Err(Error::Catalog {
                status: status.as_u16(),
                body,
            });
        }

        Ok(parse_search_page(&body))
    }
}
