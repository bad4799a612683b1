use clap::Parser;
use sheet_verifier::{
    CliArgs, LoggingConfig, Session, StartupOutcome, Verifier, VerifierConfig, init_logging,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let logging_config = LoggingConfig::from_env();
    let _guard = init_logging(logging_config)?;

    let cli = CliArgs::parse();
    let config = VerifierConfig::from_args(cli)?;

    // Validate configuration before touching the network (fail-fast)
    config.validate()?;

    let verifier = Verifier::from_config(&config)?;
    let mut session = Session::new();

    match verifier.start(&mut session).await? {
        StartupOutcome::Killed { message } => {
            anyhow::bail!("access blocked: {message}");
        }
        StartupOutcome::Ready { sheets, selected } => {
            if sheets.is_empty() {
                println!("no selectable sheets (the first sheet is reserved as an index)");
            }
            for summary in verifier.cache().summaries() {
                let marker = if selected.as_deref() == Some(summary.name.as_str()) {
                    "*"
                } else {
                    " "
                };
                println!("{marker} {summary}");
            }
        }
    }

    verifier.shutdown().await;
    Ok(())
}
