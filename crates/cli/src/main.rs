//! multiroot CLI
//!
//! Command-line interface for the multiroot display daemon.
//!
//! Each invocation sends one command to the daemon over its Unix socket,
//! prints the JSON response and exits non-zero when the daemon reports an error.

use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand, ValueEnum};
use multiroot_ipc::{decode_line, encode_line, InsetsSpec, IpcCommand, IpcResponse, PlacementPosition, PlacementSpec, RequestSource};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::UnixStream;

#[derive(Parser)]
#[command(name = "multiroot-cli")]
#[command(author, version, about = "Control the multiroot display daemon")]
struct Cli {
    /// Daemon socket (defaults to the user runtime dir)
    #[arg(long, global = true)]
    socket: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Query daemon state
    Query {
        #[command(subcommand)]
        what: QueryType,
    },
    /// Replace the connected displays, e.g. "1920x1080*2/i,2560x1440"
    Update { spec: String },
    /// Make a display primary
    Primary { id: i64 },
    /// Attach a display to an edge of another display
    Place {
        id: i64,
        /// Display to attach to
        #[arg(long)]
        parent: i64,
        #[arg(long, value_enum)]
        position: PositionArg,
        /// Offset along the edge in DIPs
        #[arg(long, default_value_t = 0, allow_negative_numbers = true)]
        offset: i32,
    },
    /// Placement used for displays without an explicit one
    DefaultPlacement {
        #[arg(value_enum)]
        position: PositionArg,
        #[arg(long, default_value_t = 0, allow_negative_numbers = true)]
        offset: i32,
    },
    /// Set overscan insets in DIPs
    Overscan {
        id: i64,
        #[command(flatten)]
        insets: InsetsArgs,
    },
    /// Rotate a display clockwise
    Rotate {
        id: i64,
        /// 0, 90, 180 or 270
        degrees: u16,
        /// Record the rotation as policy-driven rather than user-driven
        #[arg(long)]
        policy: bool,
    },
    /// Zoom the internal display
    UiScale { id: i64, scale: f32 },
    /// Reserve space at the display edges
    WorkArea {
        id: i64,
        #[command(flatten)]
        insets: InsetsArgs,
    },
    /// Warp the cursor to a host pixel
    Cursor {
        id: i64,
        #[arg(allow_negative_numbers = true)]
        x: i32,
        #[arg(allow_negative_numbers = true)]
        y: i32,
    },
    /// Convert a host pixel to root coordinates
    HostToRoot {
        id: i64,
        #[arg(allow_negative_numbers = true)]
        x: i32,
        #[arg(allow_negative_numbers = true)]
        y: i32,
    },
    /// Reload configuration
    Reload,
    /// Stop the daemon
    Stop,
}

#[derive(Subcommand)]
enum QueryType {
    /// Connected displays
    Displays,
    /// Layout of the connected set
    Layout,
    /// Cursor location and display
    Cursor,
}

#[derive(Clone, Copy, ValueEnum)]
enum PositionArg {
    Top,
    Right,
    Bottom,
    Left,
}

impl From<PositionArg> for PlacementPosition {
    fn from(arg: PositionArg) -> Self {
        match arg {
            PositionArg::Top => PlacementPosition::Top,
            PositionArg::Right => PlacementPosition::Right,
            PositionArg::Bottom => PlacementPosition::Bottom,
            PositionArg::Left => PlacementPosition::Left,
        }
    }
}

#[derive(Args)]
struct InsetsArgs {
    top: i32,
    left: i32,
    bottom: i32,
    right: i32,
}

impl From<InsetsArgs> for InsetsSpec {
    fn from(args: InsetsArgs) -> Self {
        InsetsSpec {
            top: args.top,
            left: args.left,
            bottom: args.bottom,
            right: args.right,
        }
    }
}

impl Commands {
    fn into_ipc(self) -> IpcCommand {
        match self {
            Commands::Query { what } => match what {
                QueryType::Displays => IpcCommand::QueryDisplays,
                QueryType::Layout => IpcCommand::QueryLayout,
                QueryType::Cursor => IpcCommand::QueryCursor,
            },
            Commands::Update { spec } => IpcCommand::UpdateDisplays { spec },
            Commands::Primary { id } => IpcCommand::SetPrimary { display_id: id },
            Commands::Place {
                id,
                parent,
                position,
                offset,
            } => IpcCommand::SetPlacement {
                placement: PlacementSpec {
                    display_id: id,
                    parent_id: parent,
                    position: position.into(),
                    offset,
                },
            },
            Commands::DefaultPlacement { position, offset } => IpcCommand::SetDefaultPlacement {
                position: position.into(),
                offset,
            },
            Commands::Overscan { id, insets } => IpcCommand::SetOverscan {
                display_id: id,
                insets: insets.into(),
            },
            Commands::Rotate { id, degrees, policy } => IpcCommand::SetRotation {
                display_id: id,
                rotation: degrees,
                source: if policy {
                    RequestSource::Policy
                } else {
                    RequestSource::User
                },
            },
            Commands::UiScale { id, scale } => IpcCommand::SetUiScale { display_id: id, scale },
            Commands::WorkArea { id, insets } => IpcCommand::SetWorkAreaInsets {
                display_id: id,
                insets: insets.into(),
            },
            Commands::Cursor { id, x, y } => IpcCommand::MoveCursor { display_id: id, x, y },
            Commands::HostToRoot { id, x, y } => IpcCommand::HostToRoot { display_id: id, x, y },
            Commands::Reload => IpcCommand::Reload,
            Commands::Stop => IpcCommand::Stop,
        }
    }
}

/// Send one command and wait for the single-line response.
async fn send_command(socket: &Path, cmd: &IpcCommand) -> Result<IpcResponse> {
    let stream = UnixStream::connect(socket).await.with_context(|| {
        format!(
            "Failed to connect to daemon at {}. Is multirootd running?",
            socket.display()
        )
    })?;
    let (reader, mut writer) = stream.into_split();

    let request = encode_line(cmd)?;
    writer.write_all(request.as_bytes()).await?;

    let mut reader = BufReader::new(reader);
    let mut line = String::new();
    if reader.read_line(&mut line).await? == 0 {
        bail!("Daemon closed the connection without responding");
    }
    Ok(decode_line(&line)?)
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let socket = cli.socket.unwrap_or_else(multiroot_ipc::default_socket_path);
    let cmd = cli.command.into_ipc();

    let response = send_command(&socket, &cmd).await?;
    if let IpcResponse::Error { message } = &response {
        eprintln!("Error: {}", message);
        std::process::exit(1);
    }

    println!("{}", serde_json::to_string_pretty(&response)?);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    fn parse(args: &[&str]) -> IpcCommand {
        let cli = Cli::try_parse_from(std::iter::once("multiroot-cli").chain(args.iter().copied())).unwrap();
        cli.command.into_ipc()
    }

    #[test]
    fn test_cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_query_commands() {
        assert_eq!(parse(&["query", "displays"]), IpcCommand::QueryDisplays);
        assert_eq!(parse(&["query", "layout"]), IpcCommand::QueryLayout);
        assert_eq!(parse(&["query", "cursor"]), IpcCommand::QueryCursor);
    }

    #[test]
    fn test_place_with_negative_offset() {
        assert_eq!(
            parse(&["place", "2", "--parent", "1", "--position", "bottom", "--offset", "-40"]),
            IpcCommand::SetPlacement {
                placement: PlacementSpec {
                    display_id: 2,
                    parent_id: 1,
                    position: PlacementPosition::Bottom,
                    offset: -40,
                },
            }
        );
    }

    #[test]
    fn test_rotate_source() {
        assert_eq!(
            parse(&["rotate", "5", "90"]),
            IpcCommand::SetRotation {
                display_id: 5,
                rotation: 90,
                source: RequestSource::User,
            }
        );
        assert_eq!(
            parse(&["rotate", "5", "180", "--policy"]),
            IpcCommand::SetRotation {
                display_id: 5,
                rotation: 180,
                source: RequestSource::Policy,
            }
        );
    }

    #[test]
    fn test_work_area_insets_order() {
        assert_eq!(
            parse(&["work-area", "3", "1", "2", "3", "4"]),
            IpcCommand::SetWorkAreaInsets {
                display_id: 3,
                insets: InsetsSpec {
                    top: 1,
                    left: 2,
                    bottom: 3,
                    right: 4,
                },
            }
        );
    }

    #[test]
    fn test_socket_override() {
        let cli = Cli::try_parse_from(["multiroot-cli", "stop", "--socket", "/tmp/x.sock"]).unwrap();
        assert_eq!(cli.socket, Some(PathBuf::from("/tmp/x.sock")));
        assert_eq!(cli.command.into_ipc(), IpcCommand::Stop);
    }

    #[test]
    fn test_missing_parent_is_rejected() {
        assert!(Cli::try_parse_from(["multiroot-cli", "place", "2", "--position", "left"]).is_err());
    }
}
