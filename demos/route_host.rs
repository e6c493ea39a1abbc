//! # Demo: route-driven host
//!
//! Three apps share `#shell`. Navigation goes through a coordinator over an
//! in-memory history:
//! - `/` matches nothing and is redirected to `/home`;
//! - `/admin` is vetoed and the history reverts;
//! - `/shop` then `/docs` in quick succession: the first is superseded and a
//!   single `popstate` fires.
//!
//! Run with `RUST_LOG=debug cargo run --example route_host` to see the
//! runtime's own diagnostics.

use std::sync::Arc;
use std::time::Duration;

use mountvisor::{
    ActiveWhen, AppSpec, Container, ContainerConfig, HistoryBackend, Lifecycle, LoaderFn,
    MemoryHistory, MountProps, NavigationConfig, NavigationCoordinator, PhaseError, RouteConfig,
    Subscribe,
};
use serde_json::Value;
use tracing_subscriber::EnvFilter;

/// Loader simulating a network fetch of the app's bundle.
fn app(name: &'static str, prefix: &'static str) -> AppSpec {
    let loader = LoaderFn::arc(move |_name: Arc<str>| async move {
        tokio::time::sleep(Duration::from_millis(50)).await;
        Ok::<_, PhaseError>(
            Lifecycle::builder()
                .bootstrap(|p: MountProps| async move {
                    println!("[{}] bootstrap", p.name);
                    Ok::<(), PhaseError>(())
                })
                .mount(|p: MountProps| async move {
                    tokio::time::sleep(Duration::from_millis(20)).await;
                    println!("[{}] mounted into {}", p.name, p.root);
                    Ok::<(), PhaseError>(())
                })
                .unmount(|p: MountProps| async move {
                    println!("[{}] unmounted", p.name);
                    Ok::<(), PhaseError>(())
                })
                .build(),
        )
    });
    AppSpec::new(name, loader).active_when(ActiveWhen::prefix(prefix))
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let history = Arc::new(MemoryHistory::new("/"));
    let nav = NavigationCoordinator::new(history.clone(), NavigationConfig::default());

    #[cfg(feature = "logging")]
    let subs: Vec<Arc<dyn Subscribe>> = vec![Arc::new(mountvisor::LogWriter::default())];
    #[cfg(not(feature = "logging"))]
    let subs: Vec<Arc<dyn Subscribe>> = Vec::new();

    let routes = RouteConfig::new()
        .fallback_url("/home")
        .cancel_activate_app(|url: String| async move { url.starts_with("/admin") });
    let shell = Container::builder("shell", "#shell", ContainerConfig::default())
        .with_subscribers(subs)
        .routes(routes)
        .coordinator(nav.clone())
        .build()?;
    shell.register_apps([
        app("home", "/home"),
        app("shop", "/shop"),
        app("docs", "/docs"),
        app("admin", "/admin"),
    ])?;

    shell.run().await?;
    nav.idle().await;
    println!("at {} (fallback)", history.location().url);

    let outcome = nav.push_state("/admin", Value::Null).outcome().await?;
    println!("/admin -> {outcome:?}, back at {}", history.location().url);

    let shop = nav.push_state("/shop", Value::Null);
    let docs = nav.push_state("/docs", Value::Null);
    println!("/shop -> {:?}", shop.outcome().await?);
    println!("/docs -> {:?}", docs.outcome().await?);
    println!("popstate events: {}", history.popstate_count());

    if let Some(app) = shell.current_mounted() {
        println!("mounted: {} ({})", app.name(), app.state());
    }

    shell.destroy().await?;
    Ok(())
}
