use thiserror::Error;

#[derive(Debug, Error)]
pub enum ExecError {
    #[error("failed to spawn {binary}: {source}")]
    Spawn {
        binary: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to wait for {binary}: {source}")]
    Wait {
        binary: String,
        #[source]
        source: std::io::Error,
    },

    #[error("{binary} {subcommand} timed out after {minutes} minutes")]
    TimedOut {
        binary: String,
        subcommand: String,
        minutes: u64,
    },
}
