//! School registry lookups.

use anyhow::{Context, Result, bail};

use crate::config::Config;

use super::parse_date_arg;

fn client(config: &Config) -> Result<cm_registry::Client> {
    let Some(api_key) = config.registry_api_key.as_deref() else {
        bail!("registry API key not configured (set CM_REGISTRY_API_KEY)");
    };
    cm_registry::Client::new(api_key).context("failed to build registry client")
}

fn runtime() -> Result<tokio::runtime::Runtime> {
    tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .context("failed to start async runtime")
}

/// Searches schools by name and prints matches.
pub fn search(config: &Config, name: &str) -> Result<()> {
    let client = client(config)?;
    let schools = runtime()?
        .block_on(client.search_schools(name))
        .context("school search failed")?;

    if schools.is_empty() {
        println!("No schools matched \"{name}\".");
        return Ok(());
    }
    for school in schools {
        let address = school.address.as_deref().unwrap_or("-");
        println!(
            "{}/{}  {}  {}",
            school.office_code, school.code, school.name, address
        );
    }
    Ok(())
}

/// Fetches and prints one school day's timetable.
pub fn timetable(config: &Config, office: &str, school_code: &str, date: &str) -> Result<()> {
    let date = parse_date_arg(date, "date")?;
    let client = client(config)?;
    let periods = runtime()?
        .block_on(client.fetch_timetable(office, school_code, date))
        .context("timetable lookup failed")?;

    if periods.is_empty() {
        println!("No timetable entries for {date}.");
        return Ok(());
    }
    for period in periods {
        println!("period {}: {}", period.period, period.subject);
    }
    Ok(())
}
