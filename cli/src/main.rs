use std::fs::File;
use std::io::{self, BufRead, BufReader, Read};
use std::sync::Arc;
use std::time::Duration;

use clap::{Args, Parser, Subcommand};
use tracing_subscriber::EnvFilter;
use uuid::Uuid;

use records::{ChangeBatch, ChangeOrigin, Record, RecordId, RecordKind};
use sync::{
    ClientConfig, EngineEvent, HttpPersistence, PersistenceApi, ShapeRow, WhiteboardClient,
};

#[derive(Debug, thiserror::Error)]
enum CliError {
    #[error("persistence call failed: {0}")]
    Api(#[from] sync::ApiError),
    #[error("connect failed: {0}")]
    Connect(#[from] sync::ConnectError),
    #[error("failed to read {path}: {source}")]
    Input { path: String, source: io::Error },
    #[error("invalid shape JSON on line {line}: {source}")]
    InvalidShape { line: usize, source: serde_json::Error },
}

#[derive(Parser, Debug)]
#[command(name = "whiteboard-cli", about = "Headless whiteboard sync client")]
struct Cli {
    /// Persistence API base URL.
    #[arg(long, env = "COLLAB_API_URL", default_value = "http://127.0.0.1:4000")]
    api_url: String,

    /// Relay websocket base URL.
    #[arg(long, env = "COLLAB_RELAY_URL", default_value = "ws://127.0.0.1:4000")]
    relay_url: String,

    #[arg(long, env = "COLLAB_USER_ID", default_value = "cli")]
    user_id: String,

    #[arg(long, env = "COLLAB_USER_NAME", default_value = "CLI")]
    user_name: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Page CRUD against the persistence API.
    Pages(PagesCommand),
    /// Join a page and print everything the connection delivers.
    Tail(TailArgs),
    /// Stream shape JSON lines onto a page and persist them.
    Draw(DrawArgs),
}

#[derive(Args, Debug)]
struct PagesCommand {
    #[command(subcommand)]
    command: PagesSubcommand,
}

#[derive(Subcommand, Debug)]
enum PagesSubcommand {
    List {
        whiteboard_id: i64,
    },
    Create {
        whiteboard_id: i64,
        #[arg(long)]
        title: String,
    },
    Rename {
        whiteboard_id: i64,
        page_id: i64,
        #[arg(long)]
        title: String,
    },
    Delete {
        whiteboard_id: i64,
        page_id: i64,
    },
}

#[derive(Args, Debug)]
struct TailArgs {
    whiteboard_id: i64,

    /// Page to join; defaults to the first page by sort order.
    #[arg(long)]
    page_id: Option<i64>,
}

#[derive(Args, Debug)]
struct DrawArgs {
    whiteboard_id: i64,

    /// Page to draw on; defaults to the first page by sort order.
    #[arg(long)]
    page_id: Option<i64>,

    /// Input file with one shape JSON body per line, or - for stdin.
    #[arg(long, default_value = "-")]
    input: String,
}

#[tokio::main]
async fn main() -> Result<(), CliError> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "warn".into()))
        .init();

    let cli = Cli::parse();
    match cli.command {
        Command::Pages(ref pages) => run_pages(&cli, pages).await,
        Command::Tail(ref tail) => run_tail(&cli, tail).await,
        Command::Draw(ref draw) => run_draw(&cli, draw).await,
    }
}

// =============================================================================
// PAGES
// =============================================================================

async fn run_pages(cli: &Cli, pages: &PagesCommand) -> Result<(), CliError> {
    let api = HttpPersistence::new(cli.api_url.clone());
    match &pages.command {
        PagesSubcommand::List { whiteboard_id } => {
            for page in api.list_pages(*whiteboard_id).await? {
                println!("{}\t{}", page.page_id, page.page_title);
            }
        }
        PagesSubcommand::Create { whiteboard_id, title } => {
            let page = api.create_page(*whiteboard_id, title).await?;
            println!("{}\t{}", page.page_id, page.page_title);
        }
        PagesSubcommand::Rename { whiteboard_id, page_id, title } => {
            api.rename_page(*whiteboard_id, *page_id, title).await?;
            println!("renamed {page_id}");
        }
        PagesSubcommand::Delete { whiteboard_id, page_id } => {
            api.delete_page(*whiteboard_id, *page_id).await?;
            println!("deleted {page_id}");
        }
    }
    Ok(())
}

// =============================================================================
// TAIL
// =============================================================================

async fn run_tail(cli: &Cli, tail: &TailArgs) -> Result<(), CliError> {
    let mut client = connect(cli, tail.whiteboard_id, tail.page_id).await?;
    let store = client.store();
    let mut batches = store.subscribe();
    println!("# joined whiteboard {} page {}", tail.whiteboard_id, client.current_page_id());

    loop {
        tokio::select! {
            batch = batches.recv() => {
                let Some(batch) = batch else { break };
                print_batch(&batch);
            }
            event = client.next_event() => {
                match event {
                    Some(EngineEvent::PageDeleted { page_id }) => {
                        println!("! page {page_id} was deleted by a peer; reload required");
                    }
                    None => break,
                }
            }
            _ = tokio::signal::ctrl_c() => break,
        }
    }

    client.close().await;
    Ok(())
}

/// One line per record change. Only remote state prints; user-origin batches
/// are our own writes coming back around.
fn print_batch(batch: &ChangeBatch) {
    if batch.origin != ChangeOrigin::Remote {
        return;
    }
    for (id, record) in &batch.added {
        match id.kind() {
            RecordKind::InstancePresence => {
                let name = record.data.get("userName").and_then(serde_json::Value::as_str);
                println!("+ presence {}", name.unwrap_or("?"));
            }
            _ => println!("+ {id}"),
        }
    }
    for id in batch.updated.keys() {
        if id.kind() != RecordKind::InstancePresence {
            println!("~ {id}");
        }
    }
    for id in batch.removed.keys() {
        println!("- {id}");
    }
}

// =============================================================================
// DRAW
// =============================================================================

async fn run_draw(cli: &Cli, draw: &DrawArgs) -> Result<(), CliError> {
    let client = connect(cli, draw.whiteboard_id, draw.page_id).await?;
    let page_id = client.current_page_id();
    let store = client.store();

    let bodies = read_shape_lines(&draw.input)?;
    let mut rows = Vec::with_capacity(bodies.len());
    for mut body in bodies {
        let id = shape_id(&body);
        body["id"] = serde_json::Value::String(id.clone());
        body["parentId"] = serde_json::Value::String(format!("page:{page_id}"));

        let record = Record::new(RecordId::new(id), body);
        rows.push(ShapeRow::from_record(&record));
        // User origin: the engine relays it to page peers live.
        store.put(record, ChangeOrigin::User);
    }

    // The save path is out of band of the relay, matching how the editing
    // surface persists its own shapes.
    let api = HttpPersistence::new(cli.api_url.clone());
    api.save_shapes(draw.whiteboard_id, page_id, &rows).await?;
    println!("drew {} shapes on page {page_id}", rows.len());

    // Give the outbound queue a beat to flush before tearing down.
    tokio::time::sleep(Duration::from_millis(200)).await;
    client.close().await;
    Ok(())
}

fn shape_id(body: &serde_json::Value) -> String {
    body.get("id")
        .and_then(serde_json::Value::as_str)
        .map_or_else(|| format!("shape:{}", Uuid::new_v4()), str::to_owned)
}

fn read_shape_lines(path: &str) -> Result<Vec<serde_json::Value>, CliError> {
    let reader: Box<dyn Read> = if path == "-" {
        Box::new(io::stdin())
    } else {
        Box::new(File::open(path).map_err(|source| CliError::Input {
            path: path.to_owned(),
            source,
        })?)
    };

    let mut bodies = Vec::new();
    for (index, line) in BufReader::new(reader).lines().enumerate() {
        let line = line.map_err(|source| CliError::Input { path: path.to_owned(), source })?;
        if line.trim().is_empty() {
            continue;
        }
        let body = serde_json::from_str(&line)
            .map_err(|source| CliError::InvalidShape { line: index + 1, source })?;
        bodies.push(body);
    }
    Ok(bodies)
}

// =============================================================================
// HELPERS
// =============================================================================

async fn connect(
    cli: &Cli,
    whiteboard_id: i64,
    page_id: Option<i64>,
) -> Result<WhiteboardClient, CliError> {
    let api: Arc<dyn PersistenceApi> = Arc::new(HttpPersistence::new(cli.api_url.clone()));
    let client = WhiteboardClient::connect(
        ClientConfig {
            relay_url: cli.relay_url.clone(),
            whiteboard_id,
            page_id,
            user_id: cli.user_id.clone(),
            user_name: cli.user_name.clone(),
        },
        api,
    )
    .await?;
    Ok(client)
}
