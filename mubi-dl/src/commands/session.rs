use super::options;
use crate::{
    CatalogClient, Config, CredentialSet, CredentialSupplier, KeyExchangeClient, Title,
    catalog::detect_country,
    headers::transport_headers,
    search::{TitleSearch, is_film_id},
};
use anyhow::{Result, bail};
use log::{info, warn};
use reqwest::blocking::Client;
use std::sync::{
    Arc,
    atomic::{AtomicBool, Ordering},
};

const FALLBACK_COUNTRY: &str = "US";

/// Country override, else the geolocation lookup, else `US`.
pub fn resolve_country(config: &mut Config, client: &Client) -> String {
    let country = config.country.clone().unwrap_or_else(|| {
        detect_country(client, &config.geolocation_url).unwrap_or_else(|| {
            warn!(
                "could not detect country, using {} (set --country to override)",
                FALLBACK_COUNTRY
            );
            FALLBACK_COUNTRY.to_owned()
        })
    });

    info!("Using country {}", country);
    config.country = Some(country.clone());
    country
}

/// Film ids are taken as is, anything else goes through the search page.
pub fn resolve_title(search: &TitleSearch, query: &str) -> Result<Title> {
    let query = query.trim();

    if is_film_id(query) {
        return Ok(Title::from_id(query));
    }

    match search.search(query)? {
        Some(title) => {
            info!("Found {} (film id {})", title.full_title(), title.id);
            Ok(title)
        }
        None => bail!("no search results for '{}'", query),
    }
}

/// Ctrl+C flag for the rest of the process.
pub fn interrupt_flag() -> Result<Arc<AtomicBool>> {
    let interrupted = Arc::new(AtomicBool::new(false));
    let flag = interrupted.clone();
    ctrlc::set_handler(move || {
        flag.store(true, Ordering::SeqCst);
    })?;
    Ok(interrupted)
}

/// Everything shared by the titles of one run.
pub struct Session {
    pub config: Config,
    pub credentials: CredentialSet,
    pub catalog: CatalogClient,
    pub keys: KeyExchangeClient,
    pub search: TitleSearch,
    pub interrupted: Arc<AtomicBool>,
}

impl Session {
    /// Resolve the country and supply credentials once for all titles.
    pub fn open(mut config: Config) -> Result<Self> {
        let interrupted = interrupt_flag()?;
        let client = options::client(&config)?;
        let country = resolve_country(&mut config, &client);
        let credentials = CredentialSupplier::from_config(&config, interrupted.clone()).supply()?;
        info!("Credentials accepted");

        let transport = transport_headers(&country, &config.user_agent)?;
        let catalog = CatalogClient::new(client.clone(), &config.api_url, &country, transport);
        let keys = KeyExchangeClient::new(
            &config.key_service_url,
            config.key_timeout,
            &config.user_agent,
            config.proxy.as_deref(),
        )?;
        let search = TitleSearch::new(client, &config.search_url);

        Ok(Self {
            config,
            credentials,
            catalog,
            keys,
            search,
            interrupted,
        })
    }
}
