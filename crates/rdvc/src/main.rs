#![forbid(unsafe_code)]

use anyhow::Result;
use clap::Parser;
use rdvc::commands::{self, CommandContext};
use rdvc::config::Cli;
use rdvc::events::{spawn_printer, ChannelSink, Events};
use rdvc::link;
use rdvc::peers::PeerSet;
use rdvc::rendezvous::{self, PortAllocator, RetryPolicy};
use rdvc::roster::Roster;
use rdv_common::wire::Message;
use rdv_common::ClientInfo;
use std::net::Ipv4Addr;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::net::UdpSocket;
use tracing::info;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt::init();

    let cli = Cli::parse();
    if let Err(e) = cli.validate() {
        anyhow::bail!("configuration error: {e}");
    }

    let name = match cli.name.clone() {
        Some(name) => name,
        None => prompt_for_nickname().await?,
    };
    let info = ClientInfo::new(cli.advertise_ip, cli.port, name.clone())?;

    // Bind the rendezvous socket before registering: the moment the
    // directory lists us, peers may send requests.
    let udp = UdpSocket::bind((Ipv4Addr::UNSPECIFIED, cli.port)).await?;

    println!("registering at server...");
    let (link, registered) = match link::connect(cli.server, info).await {
        Ok(connected) => connected,
        Err(e) => {
            eprintln!("registration failed: {e}");
            std::process::exit(1);
        }
    };

    let (sink, events_rx) = ChannelSink::new();
    let _printer = spawn_printer(events_rx);
    let events: Events = sink;

    let roster = Arc::new(Roster::new());
    roster.seed(registered.roster_seed.clone()).await;
    events.emit("Successfully registered at server".to_owned());

    let peers = PeerSet::new();
    let ports = Arc::new(PortAllocator::new(cli.chat_base_port));

    let reader_handle = tokio::spawn(link::run_reader(
        registered,
        roster.clone(),
        events.clone(),
    ));
    let listener_handle = tokio::spawn(rendezvous::run_listener(
        udp,
        name.clone(),
        peers.clone(),
        events.clone(),
    ));

    let ctx = CommandContext {
        local_name: name,
        link: link.clone(),
        roster,
        peers,
        ports,
        policy: RetryPolicy::default(),
        events,
    };
    let input_handle = tokio::spawn(commands::run_input_loop(
        ctx,
        BufReader::new(tokio::io::stdin()),
    ));

    tokio::select! {
        _ = reader_handle => info!("server link closed"),
        _ = input_handle => info!("input closed"),
        _ = listener_handle => info!("rendezvous listener stopped"),
        _ = tokio::signal::ctrl_c() => info!("received shutdown signal"),
    }

    println!("closing client");
    link.send(&Message::DisconnectC2S);
    // let the writer task flush the disconnect before the process ends
    tokio::time::sleep(Duration::from_millis(100)).await;

    Ok(())
}

async fn prompt_for_nickname() -> Result<String> {
    use std::io::Write;
    print!("Enter your nickname: ");
    std::io::stdout().flush()?;

    let mut line = String::new();
    BufReader::new(tokio::io::stdin()).read_line(&mut line).await?;
    Ok(line.trim().to_owned())
}
