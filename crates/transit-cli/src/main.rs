mod input;
mod output;

use anyhow::{bail, Context};
use clap::{Args, Parser, Subcommand};
use colored::Colorize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::broadcast::error::RecvError;
use transit_config::{ConfigManager, FileConfig, SessionOptions};
use transit_observability::Observability;
use transit_session::{ChannelKind, Envelope, LinkStatus, Session, SessionEvent};

#[derive(Parser)]
#[command(name = "transit")]
#[command(about = "CLI tool for IoTransit applet sessions")]
#[command(version)]
struct Cli {
    /// Enable debug mode
    #[arg(long, short, global = true, default_value = "false")]
    debug: bool,

    /// Config file path
    #[arg(long, global = true, env = "TRANSIT_CONFIG", default_value = "~/.transit/config.json")]
    config: String,

    /// Override the configured log level
    #[arg(long, global = true)]
    log_level: Option<String>,

    /// Print Prometheus metrics on exit
    #[arg(long, global = true, default_value = "false")]
    metrics: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// 连接两个通道，打印事件并转发 stdin 中的 `cp <json>` / `ab <json>`
    Run {
        /// Applet id, overrides the config file
        #[arg(long)]
        applet_id: Option<String>,
    },
    /// 发送单条消息后退出
    Send {
        /// Target channel (cp or ab)
        #[arg(long, default_value = "cp")]
        channel: ChannelKind,
        /// Applet id, overrides the config file
        #[arg(long)]
        applet_id: Option<String>,
        /// Seconds to wait for the channel to come up
        #[arg(long, default_value = "10")]
        timeout: u64,
        /// Envelope JSON, e.g. {"t":"ext","p":{"cmd":"status"}}
        message: String,
    },
    /// 配置管理命令
    Config(ConfigArgs),
}

#[derive(Args, Clone)]
struct ConfigArgs {
    #[command(subcommand)]
    command: ConfigCommands,
}

#[derive(Subcommand, Clone)]
enum ConfigCommands {
    /// 获取配置值
    Get {
        /// 配置键 (如: session.appletId, logging.level)
        key: String,
    },
    /// 设置配置值
    Set {
        /// 配置键 (如: session.controlPlanePort, logging.json)
        key: String,
        /// 配置值
        value: String,
    },
    /// 初始化默认配置
    Init {
        /// Applet id written into the template
        #[arg(long)]
        applet_id: String,
        /// 强制覆盖已有配置
        #[arg(long, default_value = "false")]
        force: bool,
    },
    /// 显示当前配置
    Show,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let config_path = transit_config::expand_tilde(&cli.config)
        .unwrap_or_else(|| PathBuf::from(&cli.config));

    if cli.debug {
        eprintln!("{}", "[DEBUG] Debug mode enabled".dimmed());
        eprintln!("{}", format!("[DEBUG] Config path: {:?}", config_path).dimmed());
    }

    match cli.command {
        Commands::Config(ref args) => handle_config(args.clone(), &config_path).await,
        Commands::Run { ref applet_id } => {
            let file = load_file_config(&config_path, applet_id.as_deref()).await?;
            let observability = init_observability(&cli, &file)?;
            let result = run_session(file.session, cli.debug).await;
            print_metrics(&cli, &observability);
            result
        }
        Commands::Send {
            channel,
            ref applet_id,
            timeout,
            ref message,
        } => {
            let envelope = Envelope::from_json(message)
                .with_context(|| format!("Invalid envelope: {}", message))?;
            let file = load_file_config(&config_path, applet_id.as_deref()).await?;
            let observability = init_observability(&cli, &file)?;
            let result = send_once(
                file.session,
                channel,
                envelope,
                Duration::from_secs(timeout),
            )
            .await;
            print_metrics(&cli, &observability);
            result
        }
    }
}

/// Config file contents, or defaults for `applet_id` when there is no file
async fn load_file_config(path: &Path, applet_id: Option<&str>) -> anyhow::Result<FileConfig> {
    let mut file = if path.exists() {
        let manager = ConfigManager::load(path).await?;
        manager.get().read().await.clone()
    } else if let Some(applet_id) = applet_id {
        FileConfig {
            session: SessionOptions::new(applet_id),
            ..FileConfig::default()
        }
    } else {
        bail!(
            "No config at {:?}; run `transit config init --applet-id <ID>` or pass --applet-id",
            path
        );
    };

    if let Some(applet_id) = applet_id {
        file.session.applet_id = Some(applet_id.to_string());
    }
    Ok(file)
}

fn init_observability(cli: &Cli, file: &FileConfig) -> anyhow::Result<Observability> {
    let mut config = transit_observability::Config::from(&file.logging).with_metrics(cli.metrics);
    if let Some(level) = &cli.log_level {
        config = config.with_log_level(level.clone());
    }
    Ok(Observability::init(config)?)
}

fn print_metrics(cli: &Cli, observability: &Observability) {
    if cli.metrics {
        println!();
        println!("{}", "📊 Metrics:".cyan().bold());
        print!("{}", observability.render_metrics());
    }
}

async fn run_session(options: SessionOptions, debug: bool) -> anyhow::Result<()> {
    let session = Session::new(options)?;
    let mut events = session.subscribe();

    println!("{}", "🔌 Transit session".cyan().bold());
    println!("{}", format!("Applet: {}", session.config().applet_id).dimmed());
    println!("{}", format!("Control plane: {}", session.config().control_plane_url()).dimmed());
    println!("{}", format!("App bridge: {}", session.config().app_bridge_url()).dimmed());
    println!("{}", "Type `cp <json>` or `ab <json>` to send, Ctrl-C to quit".dimmed());
    println!();

    session.connect();

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut stdin_open = true;

    loop {
        tokio::select! {
            event = events.recv() => match event {
                Ok(event) => println!("{}", output::render_event(&event)),
                Err(RecvError::Lagged(skipped)) => {
                    eprintln!("{}", format!("⚠️  Skipped {} events", skipped).yellow());
                }
                Err(RecvError::Closed) => break,
            },
            line = lines.next_line(), if stdin_open => match line? {
                Some(line) => match input::parse_line(&line) {
                    Ok(Some((channel, envelope))) => {
                        if debug {
                            eprintln!("{}", format!("[DEBUG] -> {} {}", channel.as_str(), envelope.t).dimmed());
                        }
                        session.send(channel, envelope);
                    }
                    Ok(None) => {}
                    Err(e) => eprintln!("{}", format!("❌ {}", e).red()),
                },
                None => stdin_open = false,
            },
            _ = tokio::signal::ctrl_c() => break,
        }
    }

    session.shutdown();
    let closed = tokio::time::timeout(Duration::from_secs(2), async {
        for kind in [ChannelKind::ControlPlane, ChannelKind::AppBridge] {
            let mut watch = session.channel(kind).watch();
            let _ = watch
                .wait_for(|snapshot| snapshot.status == LinkStatus::Disconnected)
                .await;
        }
    })
    .await;
    if closed.is_err() && debug {
        eprintln!("{}", "[DEBUG] Channels did not close in time".dimmed());
    }

    println!("{}", "👋 Goodbye!".cyan());
    Ok(())
}

async fn send_once(
    options: SessionOptions,
    channel: ChannelKind,
    envelope: Envelope,
    timeout: Duration,
) -> anyhow::Result<()> {
    let session = Session::new(options.with_auto_reconnect(false))?;
    let mut events = session.subscribe();
    let manager = session.channel(channel);

    manager.connect();
    tokio::time::timeout(timeout, wait_connected(&mut events, channel))
        .await
        .with_context(|| format!("{} did not connect within {:?}", channel, timeout))??;

    let t = envelope.t.clone();
    manager.send(envelope);
    manager.shutdown();

    // the send is handled before the shutdown, so an error shows up first
    loop {
        match events.recv().await {
            Ok(SessionEvent::SendError { channel: kind, reason }) if kind == channel => {
                bail!("{} send failed: {}", channel, reason)
            }
            Ok(SessionEvent::ConnectionClosed { channel: kind }) if kind == channel => break,
            Ok(_) | Err(RecvError::Lagged(_)) => {}
            Err(RecvError::Closed) => break,
        }
    }

    println!("{}", format!("✅ Sent {} on {}", t, channel).green());
    Ok(())
}

async fn wait_connected(
    events: &mut tokio::sync::broadcast::Receiver<SessionEvent>,
    channel: ChannelKind,
) -> anyhow::Result<()> {
    loop {
        match events.recv().await? {
            SessionEvent::Connected { channel: kind } if kind == channel => return Ok(()),
            SessionEvent::ConnectionFailed { channel: kind, error } if kind == channel => {
                bail!("{} connection failed: {}", channel, error)
            }
            _ => {}
        }
    }
}

async fn handle_config(args: ConfigArgs, config_path: &Path) -> anyhow::Result<()> {
    match args.command {
        ConfigCommands::Get { key } => {
            let manager = ConfigManager::load(config_path).await?;
            let config = manager.get().read().await.clone();

            match config.get_value(&key)? {
                Some(value) => {
                    println!("{}", format!("{} = {}", key, value).green());
                }
                None => {
                    println!("{}", format!("{} is not set", key).yellow());
                }
            }
        }
        ConfigCommands::Set { key, value } => {
            let manager = ConfigManager::load(config_path).await?;
            manager.update(|config| config.set_value(&key, &value)).await?;
            println!("{}", format!("✅ Set {} = {}", key, value).green());
        }
        ConfigCommands::Init { applet_id, force } => {
            if config_path.exists() && !force {
                println!("{}", format!("⚠️  Config already exists at {:?}", config_path).yellow());
                println!("{}", "Use --force to overwrite".dimmed());
                return Ok(());
            }

            ConfigManager::init(config_path, &applet_id).await?;

            println!("{}", format!("✅ Config initialized at {:?}", config_path).green());
            println!("{}", "You can edit this file to customize your settings".dimmed());
        }
        ConfigCommands::Show => {
            let manager = ConfigManager::load(config_path).await?;
            let config = manager.get().read().await.clone();

            println!("{}", "📋 Current Configuration:".cyan().bold());
            println!();
            println!("{}", serde_json::to_string_pretty(&config)?);
        }
    }

    Ok(())
}
