use std::error::Error;

use clmm_stream_sdk::stream::hub::DashboardClient;
use clmm_stream_sdk::stream::proto::Envelope;

fn main() -> Result<(), Box<dyn Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let page_url = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "http://localhost:8080".to_string());

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()?;

    runtime.block_on(async {
        let dashboard = DashboardClient::new(&page_url)?.open();

        let _positions = dashboard.subscribe_positions(|envelope| {
            if let Envelope::PositionUpdate {
                position_address,
                data,
                ..
            } = envelope
            {
                println!(
                    "position {position_address}: {} USD (pnl {}%, il {}%, in_range={})",
                    data.value_usd, data.pnl_percent, data.il_percent, data.in_range
                );
            }
        });
        let _alerts = dashboard.subscribe_alerts(|envelope| {
            if let Envelope::Alert {
                severity,
                title,
                message,
                ..
            } = envelope
            {
                println!("[{severity:?}] {title}: {message}");
            }
        });

        dashboard.connect_all();
        tokio::signal::ctrl_c().await?;
        dashboard.disconnect_all();
        Ok::<(), Box<dyn Error>>(())
    })?;

    Ok(())
}
