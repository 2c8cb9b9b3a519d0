use clap::{App, Arg, SubCommand};
use colored::*;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;
use tokio::time::timeout;

const DEFAULT_HOST: &str = "127.0.0.1";
const DEFAULT_PORT: &str = "5025";

// Non-query commands produce no output; stop waiting after this long.
const RESPONSE_WAIT: Duration = Duration::from_millis(300);

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let matches = App::new("tpt-cli")
        .version("0.1.0")
        .author("OPEN_TPT Developers")
        .about("SCPI client for the OPEN_TPT instrument simulator")
        .arg(
            Arg::with_name("host")
                .short("H")
                .long("host")
                .value_name("HOST")
                .help("Instrument host address")
                .takes_value(true)
                .default_value(DEFAULT_HOST)
                .global(true),
        )
        .arg(
            Arg::with_name("port")
                .short("p")
                .long("port")
                .value_name("PORT")
                .help("Instrument SCPI port")
                .takes_value(true)
                .default_value(DEFAULT_PORT)
                .global(true),
        )
        .subcommand(
            SubCommand::with_name("send")
                .about("Send a single SCPI command and print the response")
                .arg(
                    Arg::with_name("command")
                        .help("SCPI command line, e.g. '*IDN?'")
                        .required(true)
                        .index(1),
                ),
        )
        .get_matches();

    let host = matches.value_of("host").unwrap_or(DEFAULT_HOST);
    let port = matches.value_of("port").unwrap_or(DEFAULT_PORT);

    let stream = TcpStream::connect(format!("{host}:{port}")).await?;
    let (reader, mut writer) = stream.into_split();
    let mut reader = BufReader::new(reader);

    if let Some(send) = matches.subcommand_matches("send") {
        let command = send.value_of("command").unwrap_or_default();
        exchange(&mut writer, &mut reader, command).await?;
        return Ok(());
    }

    println!("{}", "OPEN_TPT SCPI console".bold().cyan());
    println!("connected to {host}:{port}, Ctrl-D to quit");

    let stdin = BufReader::new(tokio::io::stdin());
    let mut lines = stdin.lines();
    print_prompt();
    while let Some(line) = lines.next_line().await? {
        let line = line.trim();
        if !line.is_empty() {
            exchange(&mut writer, &mut reader, line).await?;
        }
        print_prompt();
    }
    println!();
    Ok(())
}

fn print_prompt() {
    print!("{} ", "tpt>".green().bold());
    use std::io::Write as _;
    let _ = std::io::stdout().flush();
}

async fn exchange<W, R>(
    writer: &mut W,
    reader: &mut BufReader<R>,
    command: &str,
) -> Result<(), Box<dyn std::error::Error>>
where
    W: AsyncWriteExt + Unpin,
    R: tokio::io::AsyncRead + Unpin,
{
    writer.write_all(command.as_bytes()).await?;
    writer.write_all(b"\n").await?;

    // Only queries answer; bounded wait covers the silent case.
    let mut response = String::new();
    match timeout(RESPONSE_WAIT, reader.read_line(&mut response)).await {
        Ok(Ok(0)) => {
            println!("{}", "connection closed by instrument".red());
        }
        Ok(Ok(_)) => {
            let text = response.trim_end();
            if text.starts_with('-') {
                println!("{}", text.red());
            } else {
                println!("{}", text.yellow());
            }
        }
        Ok(Err(e)) => return Err(e.into()),
        Err(_) => {
            if command.contains('?') {
                println!("{}", "no response (timeout)".red());
            }
        }
    }
    Ok(())
}
