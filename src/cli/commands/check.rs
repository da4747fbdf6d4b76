use std::process::ExitCode;

use charm::Store;

pub(super) async fn run(store: &Store) -> anyhow::Result<ExitCode> {
    let violations = store.check_invariants().await?;
    for violation in &violations {
        tracing::warn!(%violation, "invariant violated");
    }
    super::print_json(&violations)?;
    if violations.is_empty() {
        tracing::info!("store is consistent");
        Ok(ExitCode::SUCCESS)
    } else {
        Ok(ExitCode::FAILURE)
    }
}
