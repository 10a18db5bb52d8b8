//! Storefront shell - runs the local-first record store against a local
//! remote fixture.
//!
//! Launches the stores, reports what the cache holds, pushes pending changes
//! and saves the cache on exit.

use storefront_app::{App, Config};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "storefront_app=debug,storefront_engine=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load configuration
    dotenvy::dotenv().ok();
    let config = Config::from_env()?;

    tracing::info!(
        page_size = config.page_size,
        data_path = %config.data_path.display(),
        "Starting storefront"
    );

    let app = App::launch(config).await?;
    let registry = app.registry();

    tracing::info!(
        products = registry.products().count(),
        product_options = registry.product_options().count(),
        quotes = registry.quotes().count(),
        "Stores ready"
    );

    for product in registry.products().records() {
        let families = registry
            .product_options()
            .families(&product)
            .unwrap_or_default();
        tracing::info!(
            product = product.name.as_deref().unwrap_or("<unnamed>"),
            families = families.len(),
            "Product"
        );
    }

    app.shutdown().await?;

    Ok(())
}
