use super::{
    options::{self, ClientOptions},
    session::resolve_country,
};
use crate::{Config, search::TitleSearch};
use anyhow::Result;
use clap::Args;
use kdam::term::Colorizer;
use log::warn;

/// Look up titles and show where they are available.
#[derive(Args, Clone, Debug)]
pub struct Search {
    /// Search queries.
    #[arg(required = true, value_name = "QUERY")]
    pub queries: Vec<String>,

    #[command(flatten)]
    pub client: ClientOptions,
}

impl Search {
    pub fn execute(self) -> Result<()> {
        let mut config = Config::default();
        self.client.apply(&mut config);

        let client = options::client(&config)?;
        let country = resolve_country(&mut config, &client);
        let search = TitleSearch::new(client, &config.search_url);

        for query in &self.queries {
            let Some(title) = search.search(query)? else {
                warn!("no search results for '{}'", query);
                continue;
            };

            println!(
                "{} {} (film id {})",
                "Found".colorize("bold green"),
                title.full_title(),
                title.id
            );

            if let Some(url) = title.url() {
                println!("      {}", url);
            }

            if !title.countries.is_empty() {
                println!("      showing in {}", title.countries.join(", "));
            }

            if !title.is_available_in(&country) {
                println!(
                    "      {} in {}",
                    "not available".colorize("bold red"),
                    country
                );
            }
        }

        Ok(())
    }
}
