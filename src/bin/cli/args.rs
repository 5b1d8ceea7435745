use clap::Parser;

#[derive(Parser)]
#[command(name = "stomp-ws")]
#[command(version)]
#[command(about = "Interactive single-topic STOMP client over WebSocket")]
pub struct Cli {
    /// Broker WebSocket endpoint
    #[arg(short, long, default_value = "ws://127.0.0.1:15674/ws")]
    pub url: String,

    /// Login username
    #[arg(short, long)]
    pub login: Option<String>,

    /// Passcode
    #[arg(short, long)]
    pub passcode: Option<String>,

    /// Virtual host sent in CONNECT
    #[arg(long)]
    pub host: Option<String>,

    /// Heartbeat settings (client-send,client-receive in ms)
    #[arg(long, default_value = "10000,10000")]
    pub heartbeat: String,

    /// Milliseconds between reconnection attempts (0 disables)
    #[arg(long, default_value_t = 5000)]
    pub reconnect_delay: u64,

    /// Topic to subscribe to once connected
    #[arg(short, long)]
    pub subscribe: Option<String>,

    /// Log filter used when RUST_LOG is unset
    #[arg(long, default_value = "warn")]
    pub log_level: String,

    /// Show session summary on exit
    #[arg(long)]
    pub summary: bool,
}
