use clap::Parser;
use client::bot::{run_bot, BotExit, ChatBot, Responder, RESPONSE_DELAY};
use client::persona::{Persona, PersonaKind};
use client::session;
use client::terminal::{run_terminal, TerminalExit};
use client::weather::{CityTable, MetClient, WeatherBot};
use log::info;
use std::io::Write;
use std::path::PathBuf;
use tokio::io::{AsyncBufReadExt, BufReader};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Server address to connect to
    #[arg(short = 's', long, default_value = "127.0.0.1:2020")]
    server: String,

    /// Display name; asked for interactively when omitted
    #[arg(short = 'u', long)]
    username: Option<String>,

    /// Run a bot with a built-in persona instead of the terminal client
    #[arg(short = 'b', long, value_enum)]
    bot: Option<PersonaKind>,

    /// Run a bot with reply tables loaded from a JSON file
    #[arg(long, conflicts_with = "bot")]
    persona_file: Option<PathBuf>,

    /// Directory for cached forecasts of the weather bot
    #[arg(long, default_value = "weather_cache")]
    weather_cache: PathBuf,

    /// JSON file with extra cities for the weather bot
    #[arg(long)]
    cities_file: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();

    let args = Args::parse();

    let persona = match (&args.persona_file, args.bot) {
        (Some(path), _) => Some(Persona::from_file(path)?),
        (None, Some(kind)) => Some(Persona::builtin(kind)?),
        (None, None) => None,
    };

    if let Some(mut persona) = persona {
        if let Some(username) = args.username {
            persona.name = username;
        }
        info!("Starting bot {} against {}", persona.name, args.server);

        let (reader, writer) = session::connect(&args.server, persona.name()).await?;
        let exit = if args.bot == Some(PersonaKind::Weather) {
            let cities = match &args.cities_file {
                Some(path) => CityTable::with_file(path)?,
                None => CityTable::default(),
            };
            let provider = MetClient::new(cities, &args.weather_cache)?;
            let bot = ChatBot::new(WeatherBot::new(persona, provider));
            run_bot(reader, writer, bot, RESPONSE_DELAY).await?
        } else {
            run_bot(reader, writer, ChatBot::new(persona), RESPONSE_DELAY).await?
        };
        match exit {
            BotExit::Kicked(reason) => info!("Bot was kicked by the host for {}", reason),
            BotExit::Closed => info!("Server closed the connection"),
        }
        return Ok(());
    }

    let mut stdin = BufReader::new(tokio::io::stdin());
    let username = match args.username {
        Some(username) => username,
        None => {
            print!("Please enter your username: ");
            std::io::stdout().flush()?;
            let mut line = String::new();
            stdin.read_line(&mut line).await?;
            line.trim().to_string()
        }
    };

    let (reader, writer) = session::connect(&args.server, &username).await?;
    println!(
        "Connected to {} as {}. Type {} to leave.",
        args.server,
        username,
        client::terminal::EXIT_COMMAND
    );

    match run_terminal(stdin, reader, writer, std::io::stdout()).await? {
        TerminalExit::UserQuit => println!("Goodbye!"),
        TerminalExit::Kicked(_) | TerminalExit::ServerClosed => {}
    }

    Ok(())
}
