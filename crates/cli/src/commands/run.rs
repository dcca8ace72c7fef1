//! `pagemind run` — drive the cognition loop.

use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use tracing::{error, info};

use pagemind_agent::Agent;
use pagemind_config::AgentConfig;
use pagemind_core::error::{Error, Result};
use pagemind_providers::OpenAiCompatProvider;

pub async fn run(config_path: &Path, max_steps: Option<u64>) -> Result<()> {
    let config = AgentConfig::load(config_path).map_err(Error::from)?;
    info!(
        endpoint = %config.endpoint,
        model = %config.model,
        phase = %config.initial_phase,
        "Starting agent"
    );

    let provider = OpenAiCompatProvider::new(&config.endpoint, config.api_key.clone())?;
    let mut agent = Agent::new(config, Arc::new(provider));
    agent.load_persisted()?;

    let cancel = Arc::new(AtomicBool::new(false));
    {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                info!("Cancellation requested, finishing current step");
                cancel.store(true, Ordering::Relaxed);
            }
        });
    }

    match max_steps {
        Some(limit) => {
            for _ in 0..limit {
                if cancel.load(Ordering::Relaxed) {
                    break;
                }
                if let Err(err) = agent.step().await {
                    error!(phase = %agent.phase(), "Step failed: {err}");
                    return Err(err);
                }
            }
            info!(steps = agent.iterations(), "Step limit reached");
        }
        None => {
            agent.run(cancel).await?;
        }
    }
    Ok(())
}
