use clap::Parser;
use log::{error, info};
use server::config::ServerConfig;
use server::host::{spawn_host_generator, HostPrompts};
use server::network::Server;
use server::{admin, logging};
use std::net::IpAddr;
use std::path::PathBuf;
use std::process::ExitCode;
use std::thread;
use std::time::Duration;

/// Starts the chat relay, the host generator and the operator console.
fn main() -> ExitCode {
    // Command line arguments
    #[derive(Parser, Debug)]
    #[clap(author, version, about)]
    struct Args {
        /// Address to bind to
        #[clap(short = 'H', long, default_value = "0.0.0.0")]
        bind: IpAddr,
        /// Port to listen on
        #[clap(short, long, default_value_t = shared::DEFAULT_PORT)]
        port: u16,
        /// File with one conversation starter per line
        #[clap(long)]
        prompts_file: Option<PathBuf>,
        /// Seconds between two host prompts
        #[clap(long, default_value = "90")]
        host_interval: u64,
        /// Directory for the dated log file; stderr when omitted
        #[clap(long)]
        log_dir: Option<PathBuf>,
    }

    let args = Args::parse();

    if let Err(e) = logging::init(args.log_dir.as_deref()) {
        eprintln!("Failed to set up logging: {}", e);
        return ExitCode::FAILURE;
    }

    let config = ServerConfig {
        bind: args.bind,
        port: args.port,
        host_interval: Duration::from_secs(args.host_interval),
        prompts_file: args.prompts_file,
        ..ServerConfig::default()
    };

    let mut server = match Server::bind(config.clone()) {
        Ok(server) => server,
        Err(e) => {
            error!("{}", e);
            eprintln!("{}", e);
            return ExitCode::FAILURE;
        }
    };
    println!(
        "Service is listening to incoming connections on {}.",
        server.local_addr()
    );

    let handle = server.control_handle();
    let prompts = HostPrompts::load(config.prompts_file.as_deref(), config.prompt_lifetime);
    if let Err(e) = spawn_host_generator(prompts, config.host_interval, handle.clone()) {
        error!("Failed to start the host: {}", e);
        return ExitCode::FAILURE;
    }

    // The console blocks on stdin and is left behind once the loop ends
    let console_handle = handle.clone();
    let console = thread::Builder::new()
        .name("console".to_string())
        .spawn(move || {
            let stdin = std::io::stdin();
            if let Err(e) = admin::run_console(stdin.lock(), std::io::stdout(), &console_handle) {
                error!("Console failed: {}", e);
                console_handle.stop();
            }
        });
    if let Err(e) = console {
        error!("Failed to start the console: {}", e);
        return ExitCode::FAILURE;
    }

    let result = thread::Builder::new()
        .name("multiplexer".to_string())
        .spawn(move || server.run())
        .map_err(|e| e.to_string())
        .and_then(|loop_thread| {
            loop_thread
                .join()
                .map_err(|_| "the server loop panicked".to_string())
        });

    match result {
        Ok(Ok(())) => {
            info!("Service stopped");
            ExitCode::SUCCESS
        }
        Ok(Err(e)) => {
            error!("{}", e);
            handle.stop();
            ExitCode::FAILURE
        }
        Err(e) => {
            error!("{}", e);
            handle.stop();
            ExitCode::FAILURE
        }
    }
}
