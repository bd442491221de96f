use clap::Parser;

#[derive(Parser, Debug)]
#[command(name = "spinroom-server", about = "Spinroom shared DJ room server")]
pub struct Args {
    /// Path to configuration file
    #[arg(short, long, default_value = "config/spinroom.toml")]
    pub config: String,

    /// Bind address (overrides config)
    #[arg(long)]
    pub bind: Option<String>,
}
