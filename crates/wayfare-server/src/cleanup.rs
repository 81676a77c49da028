use std::time::Duration;

use tracing::{info, warn};

use wayfare_api::AppState;

/// Background task that prunes expired trips.
///
/// Runs on an interval and deletes trips whose end date is more than a day in
/// the past; participants and group messages go with them via cascade. The
/// same operation is exposed to admins as POST /api/trips/sweep.
pub async fn run_sweep_loop(state: AppState, interval_secs: u64) {
    let mut interval = tokio::time::interval(Duration::from_secs(interval_secs));

    loop {
        interval.tick().await;

        let st = state.clone();
        let result = tokio::task::spawn_blocking(move || st.db.sweep_expired_trips()).await;

        match result {
            Ok(Ok(count)) => {
                if count > 0 {
                    info!("Sweep: removed {} expired trips", count);
                }
            }
            Ok(Err(e)) => warn!("Sweep error: {}", e),
            Err(e) => warn!("Sweep task join error: {}", e),
        }
    }
}
