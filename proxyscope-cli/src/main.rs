// Copyright 2025 Sushanth (https://github.com/sushanthpy)
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU Affero General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
// GNU Affero General Public License for more details.
//
// You should have received a copy of the GNU Affero General Public License
// along with this program. If not, see <https://www.gnu.org/licenses/>.

//! Proxyscope CLI
//!
//! Terminal front end for the transaction dashboard: listings, the latest
//! panel of a project, statistics charts and granularity resolution.

use anyhow::{anyhow, bail, Context, Result};
use chrono::{DateTime, Utc};
use clap::{Parser, Subcommand};
use proxyscope_core::{
    enabled_granularities, format_timestamp, parse_timestamp, select_granularity, AddressParams,
    DashboardConfig, FilterKey, FilterUpdate, Granularity, PageInfo, StatisticsKind,
};
use proxyscope_query::{
    DashboardSource, HttpSource, ListingDescriptor, ListingPipeline, MemorySource, QueryState,
    StatisticsPipeline, StatisticsQuery,
};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "proxyscope")]
#[command(about = "Proxyscope - LLM proxy transactions dashboard", long_about = None)]
struct Cli {
    /// Configuration file (TOML)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// API base URL (overrides config and environment)
    #[arg(long)]
    api: Option<String>,

    /// Serve data from a JSON file of transaction records instead of the API
    #[arg(long)]
    fixture: Option<PathBuf>,

    /// Output as JSON (machine-readable)
    #[arg(long)]
    json: bool,

    /// Verbose mode
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List transactions
    Transactions {
        /// Shared link query string to start from
        #[arg(long)]
        link: Option<String>,

        /// Project ID
        #[arg(long)]
        project: Option<String>,

        /// Comma separated tags; every tag must match
        #[arg(long)]
        tags: Option<String>,

        /// Range start (RFC 3339 or YYYY-MM-DD)
        #[arg(long)]
        from: Option<String>,

        /// Range end (RFC 3339 or YYYY-MM-DD)
        #[arg(long)]
        to: Option<String>,

        /// Page number (1-based)
        #[arg(long)]
        page: Option<u64>,

        /// Rows per page
        #[arg(long)]
        page_size: Option<u64>,

        /// Sort column
        #[arg(long)]
        sort_field: Option<String>,

        /// Sort ascending (default is descending)
        #[arg(long)]
        sort_asc: bool,
    },

    /// Latest transactions of a project
    Latest {
        /// Project ID
        #[arg(long)]
        project: String,
    },

    /// Statistics chart data
    Stats {
        /// Statistics kind (count, cost, speed)
        kind: StatisticsKind,

        /// Range start
        #[arg(long)]
        from: String,

        /// Range end
        #[arg(long)]
        to: String,

        /// Project ID
        #[arg(long)]
        project: Option<String>,

        /// Period (yearly, monthly, weekly, daily, hourly, 5minute)
        #[arg(long)]
        period: Option<Granularity>,

        /// Only print this metric
        #[arg(long)]
        metric: Option<String>,
    },

    /// Show which periods a range allows
    Granularity {
        /// Range start
        #[arg(long)]
        from: String,

        /// Range end
        #[arg(long)]
        to: String,

        /// Previously selected period
        #[arg(long)]
        previous: Option<Granularity>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Logs go to stderr; stdout is reserved for output.
    let default_level = if cli.verbose { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let mut config =
        DashboardConfig::load(cli.config.as_deref()).context("Failed to load configuration")?;
    if let Some(api) = &cli.api {
        config.api.base_url = api.clone();
    }

    match cli.command {
        Commands::Granularity {
            from,
            to,
            previous,
        } => {
            let (from, to) = (parse_time("from", &from)?, parse_time("to", &to)?);
            let enabled = enabled_granularities(Some(from), Some(to));
            let selected = select_granularity(previous, &enabled);
            if cli.json {
                println!(
                    "{}",
                    serde_json::json!({ "enabled": enabled, "selected": selected })
                );
            } else {
                let names: Vec<&str> = enabled.iter().map(|g| g.as_str()).collect();
                if names.is_empty() {
                    println!("Enabled:  (none, range cannot be aggregated)");
                } else {
                    println!("Enabled:  {}", names.join(", "));
                }
                println!("Selected: {}", selected);
            }
        }

        Commands::Transactions {
            link,
            project,
            tags,
            from,
            to,
            page,
            page_size,
            sort_field,
            sort_asc,
        } => {
            let source = open_source(&cli.fixture, &config)?;
            let address = AddressParams::parse(link.as_deref().unwrap_or_default());
            let mut listing = ListingPipeline::new(
                ListingDescriptor::transactions(&config.listing),
                source,
                address,
                &config.listing,
            );

            let mut update = FilterUpdate::new();
            for (key, value) in [
                (FilterKey::ProjectId, project),
                (FilterKey::Tags, tags),
                (FilterKey::DateFrom, from),
                (FilterKey::DateTo, to),
                (FilterKey::SortField, sort_field),
                (FilterKey::PageSize, page_size.map(|s| s.to_string())),
                (FilterKey::Page, page.map(|p| p.to_string())),
            ] {
                if let Some(value) = value {
                    update = update.set(key, value);
                }
            }
            if sort_asc {
                update = update.set(FilterKey::SortType, "asc");
            }

            listing.apply(&update).await.context("Invalid filters")?;
            print_listing(&listing, cli.json)?;
        }

        Commands::Latest { project } => {
            let source = open_source(&cli.fixture, &config)?;
            let mut listing = ListingPipeline::new(
                ListingDescriptor::latest_for_project(&project, &config.listing),
                source,
                AddressParams::new(),
                &config.listing,
            );
            listing.load().await;
            print_listing(&listing, cli.json)?;
        }

        Commands::Stats {
            kind,
            from,
            to,
            project,
            period,
            metric,
        } => {
            let (from, to) = (parse_time("from", &from)?, parse_time("to", &to)?);
            let source = open_source(&cli.fixture, &config)?;
            let mut stats = StatisticsPipeline::new(
                StatisticsQuery::new(source, kind),
                config.statistics.default_period,
            );
            stats.set_project(project).await;
            match period {
                Some(period) => {
                    stats
                        .set_range_with_period(Some(from), Some(to), period)
                        .await
                        .context("Period not available for this range")?;
                }
                None => {
                    stats.set_range(Some(from), Some(to)).await;
                }
            }

            let resolution = stats.resolution();
            if !resolution.can_aggregate() {
                bail!("range cannot be aggregated");
            }
            let series = match stats.series() {
                QueryState::Ready(series) => series,
                QueryState::Failed(e) => bail!("{} ({})", e.message, e.code),
                QueryState::Pending | QueryState::Disabled => bail!("no statistics loaded"),
            };
            info!(kind = %kind, period = %resolution.selected, buckets = series.records.len(), "statistics loaded");

            if cli.json {
                println!("{}", serde_json::to_string_pretty(&series)?);
                return Ok(());
            }

            let metrics: Vec<String> = match metric {
                Some(metric) => vec![metric],
                None => kind.metrics().iter().map(|m| m.to_string()).collect(),
            };
            println!("Period: {}", resolution.selected);
            println!("Legend: {}", series.legend.keys().join(", "));
            if series.is_empty() {
                println!("no statistics");
                return Ok(());
            }
            let mut header = vec!["date".to_string()];
            for metric in &metrics {
                for dimension in series.legend.keys() {
                    header.push(format!("{} {}", metric, dimension));
                }
            }
            println!("{}", header.join("\t"));
            for record in &series.records {
                let mut row = vec![format_timestamp(record.date)];
                for metric in &metrics {
                    for dimension in series.legend.keys() {
                        row.push(
                            record
                                .value(metric, dimension)
                                .map(|v| v.to_string())
                                .unwrap_or_else(|| "-".to_string()),
                        );
                    }
                }
                println!("{}", row.join("\t"));
            }
        }
    }

    Ok(())
}

fn open_source(
    fixture: &Option<PathBuf>,
    config: &DashboardConfig,
) -> Result<Arc<dyn DashboardSource>> {
    match fixture {
        Some(path) => {
            let source = MemorySource::from_file(path)
                .with_context(|| format!("Failed to load fixture {:?}", path))?;
            debug!(records = source.len(), "fixture loaded");
            Ok(Arc::new(source))
        }
        None => {
            let source = HttpSource::new(&config.api).context("Failed to build HTTP client")?;
            debug!(base_url = %source.base_url(), "using API");
            Ok(Arc::new(source))
        }
    }
}

fn parse_time(name: &str, value: &str) -> Result<DateTime<Utc>> {
    parse_timestamp(value).ok_or_else(|| anyhow!("invalid --{} timestamp: {}", name, value))
}

fn print_listing(listing: &ListingPipeline, json: bool) -> Result<()> {
    let page = match listing.state() {
        QueryState::Ready(page) => page,
        QueryState::Failed(e) => bail!("{} ({})", e.message, e.code),
        QueryState::Disabled => bail!("query disabled: a project is required"),
        QueryState::Pending => bail!("query did not complete"),
    };
    let info = listing.page_info().unwrap_or_else(|| page.page_info());

    if json {
        println!(
            "{}",
            serde_json::to_string_pretty(&serde_json::json!({
                "page": page,
                "page_info": info,
                "link": listing.query_string(),
            }))?
        );
        return Ok(());
    }

    if page.items.is_empty() {
        println!("no transactions");
    } else {
        let descriptor = listing.descriptor();
        println!("{}", descriptor.header().join("\t"));
        for row in listing.rows() {
            println!("{}", row.join("\t"));
        }
    }
    println!();
    print_page_info(&info);
    println!("Link: ?{}", listing.query_string());
    Ok(())
}

fn print_page_info(info: &PageInfo) {
    println!(
        "Page {} of {} ({} transactions, {} per page)",
        info.page_index,
        info.total_pages.max(1),
        info.total_elements,
        info.page_size
    );
}
