use std::net::SocketAddr;

use dotenvy::dotenv;
use tracing::info;

use paygrid::infra::{
    app::create_app,
    scheduler::{run_expiry_sweep_loop, run_recovery_loop},
    setup::init_app_state,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv().ok();

    let app_state = init_app_state().await?;

    let bind_addr = app_state.config.bind_addr;

    let app = create_app(app_state.clone());

    // Background workers: lost-payment recovery and the subscription sweep
    tokio::spawn(run_recovery_loop(
        app_state.scanner.clone(),
        app_state.config.clone(),
    ));
    tokio::spawn(run_expiry_sweep_loop(
        app_state.engine.clone(),
        app_state.config.clone(),
    ));

    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;

    info!("paygrid listening at {}", &listener.local_addr()?);

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await?;

    Ok(())
}
