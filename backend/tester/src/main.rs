use std::fmt::Debug;
use std::sync::Arc;

use clap::{Parser, ValueEnum};
use serde::de::DeserializeOwned;

use client::pagination::PageView;
use client::{
    AuthClient, Entity, Guest, HttpFetcher, PaginationConfig, Paginator,
};

#[derive(Debug, Clone, Copy, ValueEnum)]
enum EntityArg {
    Guests,
    Events,
    Checkin,
}

#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Args {
    /// Proxy base URL
    #[arg(long, default_value = "http://localhost:3000")]
    base_url: String,

    /// Which collection to page through
    #[arg(long, value_enum, default_value_t = EntityArg::Guests)]
    entity: EntityArg,

    /// How many pages to walk forward from page 1
    #[arg(long, default_value_t = 3)]
    walk: u32,

    #[arg(long, default_value_t = 10)]
    items_per_page: u32,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let auth = Arc::new(AuthClient::new(args.base_url.clone())?);
    let config = PaginationConfig {
        items_per_page: args.items_per_page,
        ..PaginationConfig::default()
    };

    match args.entity {
        EntityArg::Guests => {
            let fetcher = HttpFetcher::new(auth, Entity::Guests);
            walk::<Guest>(fetcher, config, args.walk).await
        }
        EntityArg::Events => {
            let fetcher = HttpFetcher::new(auth, Entity::Events);
            walk::<client::Event>(fetcher, config, args.walk).await
        }
        EntityArg::Checkin => {
            let fetcher = HttpFetcher::new(auth, Entity::Checkin);
            walk::<Guest>(fetcher, config, args.walk).await
        }
    }
}

async fn walk<T>(fetcher: HttpFetcher, config: PaginationConfig, pages: u32) -> anyhow::Result<()>
where
    T: DeserializeOwned + Clone + Debug + Send + Sync + 'static,
{
    let pager: Paginator<T, HttpFetcher> = Paginator::new(fetcher, config);

    pager.initial_load().await?;
    print_view(&pager.view());

    for _ in 0..pages {
        pager.next_page().await;
        print_view(&pager.view());
    }

    pager.refresh_page(None).await?;
    println!("Refreshed page {}", pager.view().current_page);

    pager.shutdown();
    Ok(())
}

fn print_view<T: Clone + Debug>(view: &PageView<T>) {
    println!(
        "Page {}/{} ({} items total, showing {}-{})",
        view.current_page,
        view.total_pages,
        view.total_items,
        view.start_index + 1,
        view.end_index
    );

    for item in &view.current_items {
        println!("  {item:?}");
    }

    if let Some(error) = &view.error {
        println!("  Error: {error}");
    }
}
