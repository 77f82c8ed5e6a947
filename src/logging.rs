use tracing::Level;
use tracing_subscriber::EnvFilter;

// webrtc is chatty below warn
const QUIET_TARGETS: [&str; 3] = ["webrtc=warn", "webrtc_ice=warn", "webrtc_sctp=warn"];

/// Install the global subscriber. `RUST_LOG` directives win over `level`.
pub fn init(level: Level) {
    let mut filter = EnvFilter::builder()
        .with_default_directive(level.into())
        .from_env_lossy();
    for target in QUIET_TARGETS {
        if let Ok(directive) = target.parse() {
            filter = filter.add_directive(directive);
        }
    }

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .try_init();
}

pub fn level_for(verbose: bool) -> Level {
    if verbose {
        Level::DEBUG
    } else {
        Level::INFO
    }
}
