use std::io::{self, Write};
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use marginalia::export::export_markdown;
use marginalia::offsets::OffsetError;
use marginalia::threads::ThreadIndex;
use marginalia::utils::{ensure_database_directory, format_date, format_relative_time, now};
use marginalia::{
    AnnotationId, Config, Database, DocumentId, IdentityProvider, Library, PermissionLevel,
    StaticIdentity, StoreError, ViewState, ViewerController, ViewerError,
};
use thiserror::Error;
use time::Duration;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// marg - read, highlight and discuss documents together
#[derive(Parser)]
#[command(name = "marg")]
#[command(about = "Shared document reader with highlights and threaded comments")]
#[command(version)]
struct Cli {
    /// Act as this user (overrides MARGINALIA_USER)
    #[arg(long = "as", value_name = "USERNAME", global = true)]
    as_user: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Manage users
    #[command(subcommand)]
    User(UserCommand),

    /// Manage documents and who can read them
    #[command(subcommand)]
    Doc(DocCommand),

    /// Highlight a range of a document (UTF-16 offsets)
    Highlight {
        document: DocumentId,
        start: usize,
        end: usize,
    },

    /// Reply to a highlight or comment
    Comment {
        parent: AnnotationId,
        #[arg(value_name = "TEXT")]
        content: String,
    },

    /// Delete a highlight or comment
    Delete { annotation: AnnotationId },

    /// Print a document's annotation threads
    Threads {
        document: DocumentId,
        /// Print JSON instead of text
        #[arg(long)]
        json: bool,
    },

    /// Print the document body as annotated HTML
    Render {
        document: DocumentId,
        /// Mark case-insensitive matches of this term
        #[arg(long, value_name = "TERM")]
        search: Option<String>,
        /// Mark this highlight as selected
        #[arg(long, value_name = "ID")]
        selected: Option<AnnotationId>,
    },

    /// Print the document and its threads as Markdown
    Export { document: DocumentId },

    /// Open the document in the terminal viewer
    View { document: DocumentId },
}

#[derive(Subcommand)]
enum UserCommand {
    /// Register a user
    Add {
        username: String,
        /// Display name
        #[arg(long)]
        name: Option<String>,
    },
}

#[derive(Subcommand)]
enum DocCommand {
    /// Import a text file as a new document
    Add {
        title: String,
        file: PathBuf,
        #[arg(long, default_value = "text/plain")]
        mime: String,
    },
    /// List documents you own or that are shared with you
    List,
    /// Share a document with another user
    Share {
        document: DocumentId,
        username: String,
        /// view, comment or edit
        level: PermissionLevel,
    },
    /// Turn public read access on or off
    Public { document: DocumentId, state: Toggle },
    /// Print a link token that grants access to whoever joins with it
    Link {
        document: DocumentId,
        /// view, comment or edit
        #[arg(long, default_value = "view")]
        level: PermissionLevel,
        /// Days until the link expires
        #[arg(long, default_value_t = 7, value_parser = clap::value_parser!(u32).range(1..))]
        days: u32,
    },
    /// Gain access to a document through a link token
    Join { token: String },
    /// Deactivate a link token
    Unlink { token: String },
}

#[derive(Clone, Copy, ValueEnum)]
enum Toggle {
    On,
    Off,
}

/// A problem with the user's input rather than with the system.
#[derive(Debug, Error)]
#[error("{0}")]
struct UsageError(String);

fn main() {
    let cli = Cli::parse();

    let config = match Config::from_env() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Error: {e:#}");
            std::process::exit(1);
        }
    };
    init_tracing(&config, matches!(cli.command, Commands::View { .. }));

    if let Err(e) = run(&cli, &config) {
        let exit_code = if is_user_error(&e) { 1 } else { 2 };
        eprintln!("Error: {e:#}");
        std::process::exit(exit_code);
    }
}

/// Logs go to stderr. The terminal viewer owns the screen, so it stays
/// silent unless `RUST_LOG` asks otherwise.
fn init_tracing(config: &Config, interactive: bool) {
    let fallback = if interactive { "off" } else { config.log_filter.as_str() };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(fallback));
    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(io::stderr))
        .try_init();
}

/// User errors are validation, permission and lookup failures. Database and
/// I/O failures are internal.
fn is_user_error(error: &anyhow::Error) -> bool {
    let store_is_user = |e: &StoreError| !matches!(e, StoreError::Transport(_));
    error.chain().any(|cause| {
        if cause.is::<UsageError>() || cause.is::<OffsetError>() {
            return true;
        }
        if let Some(e) = cause.downcast_ref::<StoreError>() {
            return store_is_user(e);
        }
        match cause.downcast_ref::<ViewerError>() {
            Some(ViewerError::Store(e)) => store_is_user(e),
            Some(_) => true,
            None => false,
        }
    })
}

fn run(cli: &Cli, config: &Config) -> Result<()> {
    ensure_database_directory(&config.database_path)?;
    let db = Database::open(&config.database_path).context("Failed to open database")?;
    let library = open_library(db, config, cli.as_user.as_deref())?;

    execute(&cli.command, &library, &mut io::stdout())
}

/// Builds the library with the acting identity: `--as` first, then
/// `MARGINALIA_USER`, else anonymous.
fn open_library(db: Database, config: &Config, as_user: Option<&str>) -> Result<Library> {
    let library = Library::new(db).with_delete_policy(config.delete_policy);

    let identity = match as_user.or(config.username.as_deref()) {
        Some(name) => {
            let user = library
                .find_user(name)
                .context("Failed to look up user")?
                .ok_or_else(|| UsageError(format!("unknown user {name:?}")))?;
            tracing::debug!(user = %user.id, username = %user.username, "acting as user");
            StaticIdentity::user(user.id)
        }
        None => StaticIdentity::anonymous(),
    };

    Ok(library.with_identity(identity))
}

fn execute(command: &Commands, library: &Library, out: &mut impl Write) -> Result<()> {
    match command {
        Commands::User(UserCommand::Add { username, name }) => {
            let user = library.create_user(username, name.as_deref())?;
            writeln!(out, "User created (id: {}): {}", user.id, user.username)?;
        }
        Commands::Doc(cmd) => execute_doc(cmd, library, out)?,
        Commands::Highlight {
            document,
            start,
            end,
        } => {
            let mut viewer = open_ready(library, *document)?;
            let highlight = viewer.highlight_range(*start, *end)?;
            writeln!(
                out,
                "Highlight created (id: {}): {:?}",
                highlight.id,
                highlight.selection_text.as_deref().unwrap_or("")
            )?;
        }
        Commands::Comment { parent, content } => {
            let document = document_of(library, *parent)?;
            let mut viewer = open_ready(library, document)?;
            let comment = viewer.add_comment(*parent, content)?;
            writeln!(out, "Comment created (id: {})", comment.id)?;
        }
        Commands::Delete { annotation } => {
            let document = document_of(library, *annotation)?;
            let mut viewer = open_ready(library, document)?;
            viewer.delete_annotation(*annotation)?;
            writeln!(out, "Annotation {annotation} deleted")?;
        }
        Commands::Threads { document, json } => {
            let viewer = open_ready(library, *document)?;
            if *json {
                serde_json::to_writer_pretty(&mut *out, &viewer.threads())
                    .context("Failed to write threads")?;
                writeln!(out)?;
            } else {
                print_threads(&viewer, out)?;
            }
        }
        Commands::Render {
            document,
            search,
            selected,
        } => {
            let mut viewer = open_ready(library, *document)?;
            if let Some(term) = search {
                viewer.set_search(term);
            }
            viewer.select(*selected);
            writeln!(out, "{}", viewer.rendered_html())?;
        }
        Commands::Export { document } => {
            let viewer = open_ready(library, *document)?;
            let doc = viewer
                .document()
                .ok_or_else(|| UsageError(format!("document {document} is not loaded")))?;
            write!(out, "{}", export_markdown(doc, viewer.annotations(), now()))?;
        }
        Commands::View { document } => {
            marginalia::tui::run(library, *document)?;
        }
    }
    Ok(())
}

fn execute_doc(command: &DocCommand, library: &Library, out: &mut impl Write) -> Result<()> {
    match command {
        DocCommand::Add { title, file, mime } => {
            let text = std::fs::read_to_string(file)
                .map_err(|e| UsageError(format!("cannot read {}: {e}", file.display())))?;
            let doc = library.create_document(Some(title), &text, Some(mime))?;
            writeln!(out, "Document created (id: {}): {}", doc.id, doc.display_title())?;
        }
        DocCommand::List => {
            let user = library.current_user().ok_or(StoreError::Unauthenticated)?;
            for doc in library.list_documents_for(user)? {
                let level = doc.permission_level.map_or("-", PermissionLevel::as_str);
                writeln!(
                    out,
                    "{}\t{}\t{}\t{}\t{}",
                    doc.id,
                    doc.display_title(),
                    doc.status.as_str(),
                    level,
                    format_relative_time(doc.created_at, now())
                )?;
            }
        }
        DocCommand::Share {
            document,
            username,
            level,
        } => {
            let user = library
                .find_user(username)?
                .ok_or_else(|| UsageError(format!("unknown user {username:?}")))?;
            library.share_document(*document, user.id, *level)?;
            writeln!(out, "Shared document {document} with {} ({level})", user.username)?;
        }
        DocCommand::Public { document, state } => {
            let public = matches!(state, Toggle::On);
            library.set_public_access(*document, public)?;
            writeln!(
                out,
                "Public access {} for document {document}",
                if public { "enabled" } else { "disabled" }
            )?;
        }
        DocCommand::Link {
            document,
            level,
            days,
        } => {
            let link =
                library.create_share_link(*document, *level, Duration::days(i64::from(*days)))?;
            writeln!(
                out,
                "Share link for document {document} ({}, expires {}): {}",
                link.permission_level,
                format_date(link.expires_at),
                link.token
            )?;
        }
        DocCommand::Join { token } => {
            let doc = library.redeem_share_link(token)?;
            let level = doc.permission_level.map_or("-", PermissionLevel::as_str);
            writeln!(out, "Joined document {}: {} ({level})", doc.id, doc.display_title())?;
        }
        DocCommand::Unlink { token } => {
            library.revoke_share_link(token)?;
            writeln!(out, "Share link revoked")?;
        }
    }
    Ok(())
}

/// A viewer mounted on `document`, or the reason it cannot be read.
fn open_ready(library: &Library, document: DocumentId) -> Result<ViewerController<'_>> {
    let mut viewer = ViewerController::over(library);
    let state = viewer.open(document).clone();
    match state {
        ViewState::Ready => Ok(viewer),
        ViewState::NotFound => Err(StoreError::NotFound {
            entity: "document",
            id: document.get(),
        }
        .into()),
        ViewState::Processing => {
            Err(UsageError(format!("document {document} is still processing")).into())
        }
        ViewState::Error(message) => {
            Err(UsageError(format!("document {document} failed to process: {message}")).into())
        }
        ViewState::Loading => anyhow::bail!("document {document} did not finish loading"),
    }
}

fn document_of(library: &Library, annotation: AnnotationId) -> Result<DocumentId> {
    let row = library
        .get_annotation(annotation)?
        .ok_or(StoreError::NotFound {
            entity: "annotation",
            id: annotation.get(),
        })?;
    Ok(row.document_id)
}

fn print_threads(viewer: &ViewerController<'_>, out: &mut impl Write) -> Result<()> {
    let index: ThreadIndex<'_> = viewer.thread_index();
    let now = now();
    for thread in viewer.threads() {
        let highlight = &thread.highlight;
        writeln!(
            out,
            "[{}] {:?} by {}, {}",
            highlight.id,
            highlight.selection_text.as_deref().unwrap_or(""),
            highlight.user.display_name(),
            format_relative_time(highlight.created_at, now)
        )?;
        for node in index.comment_tree(highlight.id) {
            writeln!(
                out,
                "{}[{}] {}: {}",
                "  ".repeat(node.depth + 1),
                node.comment.id,
                node.comment.user.display_name(),
                node.comment.content.as_deref().unwrap_or("").trim()
            )?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use marginalia::DeletePolicy;

    fn config() -> Config {
        Config {
            database_path: PathBuf::from(":memory:"),
            username: None,
            delete_policy: DeletePolicy::Orphan,
            log_filter: "off".to_string(),
        }
    }

    /// Registers ada and bob, then opens the library as `acting`.
    fn library_as(acting: &str) -> Library {
        let db = Database::in_memory().unwrap();
        let setup = Library::new(db);
        setup.create_user("ada", Some("Ada Lovelace")).unwrap();
        setup.create_user("bob", None).unwrap();
        open_library(setup.into_database(), &config(), Some(acting)).unwrap()
    }

    fn output(command: Commands, library: &Library) -> Result<String> {
        let mut out = Vec::new();
        execute(&command, library, &mut out)?;
        Ok(String::from_utf8(out).unwrap())
    }

    fn add_document(library: &Library, text: &str) -> DocumentId {
        library
            .create_document(Some("Fox"), text, None)
            .unwrap()
            .id
    }

    #[test]
    fn cli_parses_global_identity_and_share_level() {
        let cli =
            Cli::try_parse_from(["marg", "doc", "share", "3", "bob", "comment", "--as", "ada"])
                .unwrap();

        assert_eq!(cli.as_user.as_deref(), Some("ada"));
        match cli.command {
            Commands::Doc(DocCommand::Share {
                document,
                username,
                level,
            }) => {
                assert_eq!(document, DocumentId::new(3));
                assert_eq!(username, "bob");
                assert_eq!(level, PermissionLevel::Comment);
            }
            _ => panic!("expected doc share"),
        }
    }

    #[test]
    fn cli_rejects_non_numeric_ids() {
        assert!(Cli::try_parse_from(["marg", "export", "abc"]).is_err());
    }

    #[test]
    fn unknown_acting_user_is_a_user_error() {
        let err = open_library(Database::in_memory().unwrap(), &config(), Some("ghost"))
            .err()
            .unwrap();

        assert!(is_user_error(&err));
        assert!(err.to_string().contains("ghost"));
    }

    #[test]
    fn user_errors_are_distinguished_from_internal_ones() {
        let forbidden = anyhow::Error::from(StoreError::Forbidden("no".into()));
        let viewer = anyhow::Error::from(ViewerError::EmptyComment);
        let transport = anyhow::Error::from(StoreError::Transport(
            rusqlite::Error::InvalidQuery,
        ));
        let io = anyhow::Error::from(io::Error::other("disk")).context("Failed to open database");

        assert!(is_user_error(&forbidden));
        assert!(is_user_error(&viewer));
        assert!(!is_user_error(&transport));
        assert!(!is_user_error(&io));
    }

    #[test]
    fn highlight_comment_and_threads_flow() {
        let library = library_as("ada");
        let doc = add_document(&library, "The quick brown fox");

        let created = output(
            Commands::Highlight {
                document: doc,
                start: 4,
                end: 9,
            },
            &library,
        )
        .unwrap();
        assert_eq!(created, "Highlight created (id: 1): \"quick\"\n");

        output(
            Commands::Comment {
                parent: AnnotationId::new(1),
                content: "  fast  ".to_string(),
            },
            &library,
        )
        .unwrap();

        let threads = output(
            Commands::Threads {
                document: doc,
                json: false,
            },
            &library,
        )
        .unwrap();
        assert!(threads.starts_with("[1] \"quick\" by Ada Lovelace, just now\n"));
        assert!(threads.contains("  [2] Ada Lovelace: fast\n"));
    }

    #[test]
    fn threads_json_is_parseable() {
        let library = library_as("ada");
        let doc = add_document(&library, "The quick brown fox");
        output(
            Commands::Highlight {
                document: doc,
                start: 16,
                end: 19,
            },
            &library,
        )
        .unwrap();

        let json = output(
            Commands::Threads {
                document: doc,
                json: true,
            },
            &library,
        )
        .unwrap();

        let value: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(value[0]["highlight"]["selection_text"], "fox");
        assert_eq!(value[0]["highlight"]["type"], "highlight");
    }

    #[test]
    fn render_marks_search_and_selection() {
        let library = library_as("ada");
        let doc = add_document(&library, "The quick brown fox");
        output(
            Commands::Highlight {
                document: doc,
                start: 4,
                end: 9,
            },
            &library,
        )
        .unwrap();

        let html = output(
            Commands::Render {
                document: doc,
                search: Some("fox".to_string()),
                selected: Some(AnnotationId::new(1)),
            },
            &library,
        )
        .unwrap();

        assert!(html.contains("is-selected"));
        assert!(html.contains("<mark class=\"search-match\">fox</mark>"));
    }

    #[test]
    fn export_prints_markdown() {
        let library = library_as("ada");
        let doc = add_document(&library, "The quick brown fox");

        let md = output(Commands::Export { document: doc }, &library).unwrap();

        assert!(md.starts_with("# Fox\n"));
        assert!(md.contains("The quick brown fox"));
    }

    #[test]
    fn reader_cannot_highlight_view_only_document() {
        let owner = library_as("ada");
        let doc = add_document(&owner, "The quick brown fox");
        let bob = owner.find_user("bob").unwrap().unwrap();
        owner
            .share_document(doc, bob.id, PermissionLevel::View)
            .unwrap();
        let reader = open_library(owner.into_database(), &config(), Some("bob")).unwrap();

        let err = output(
            Commands::Highlight {
                document: doc,
                start: 4,
                end: 9,
            },
            &reader,
        )
        .unwrap_err();

        assert!(is_user_error(&err));
    }

    #[test]
    fn missing_document_is_a_user_error() {
        let library = library_as("ada");

        let err = output(Commands::Export { document: DocumentId::new(77) }, &library).unwrap_err();

        assert!(is_user_error(&err));
        assert_eq!(err.to_string(), "document 77 not found");
    }

    #[test]
    fn doc_add_reads_file_and_list_shows_it() {
        let library = library_as("ada");
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("essay.txt");
        std::fs::write(&file, "Call me Ishmael.").unwrap();

        let created = output(
            Commands::Doc(DocCommand::Add {
                title: "Moby".to_string(),
                file,
                mime: "text/plain".to_string(),
            }),
            &library,
        )
        .unwrap();
        assert_eq!(created, "Document created (id: 1): Moby\n");

        let listed = output(Commands::Doc(DocCommand::List), &library).unwrap();
        assert_eq!(listed, "1\tMoby\tready\towner\tjust now\n");
    }

    #[test]
    fn doc_add_with_missing_file_is_a_user_error() {
        let library = library_as("ada");

        let err = output(
            Commands::Doc(DocCommand::Add {
                title: "Nope".to_string(),
                file: PathBuf::from("/definitely/not/here.txt"),
                mime: "text/plain".to_string(),
            }),
            &library,
        )
        .unwrap_err();

        assert!(is_user_error(&err));
    }

    #[test]
    fn delete_removes_annotation() {
        let library = library_as("ada");
        let doc = add_document(&library, "The quick brown fox");
        output(
            Commands::Highlight {
                document: doc,
                start: 4,
                end: 9,
            },
            &library,
        )
        .unwrap();

        let deleted = output(
            Commands::Delete {
                annotation: AnnotationId::new(1),
            },
            &library,
        )
        .unwrap();

        assert_eq!(deleted, "Annotation 1 deleted\n");
        assert!(library.get_annotation(AnnotationId::new(1)).unwrap().is_none());
    }

    #[test]
    fn cli_parses_link_options() {
        let cli = Cli::try_parse_from(["marg", "doc", "link", "3", "--level", "comment", "--days", "2"])
            .unwrap();

        assert!(matches!(
            cli.command,
            Commands::Doc(DocCommand::Link {
                level: PermissionLevel::Comment,
                days: 2,
                ..
            })
        ));
        assert!(Cli::try_parse_from(["marg", "doc", "link", "3", "--days", "0"]).is_err());
    }

    #[test]
    fn link_then_join_grants_access() {
        let owner = library_as("ada");
        let doc = add_document(&owner, "The quick brown fox");
        let link = |library: &Library| {
            output(
                Commands::Doc(DocCommand::Link {
                    document: doc,
                    level: PermissionLevel::Comment,
                    days: 7,
                }),
                library,
            )
            .unwrap()
        };

        let printed = link(&owner);
        assert!(printed.starts_with("Share link for document 1 (comment, expires "));
        assert_eq!(link(&owner), printed);
        let token = printed.trim_end().rsplit(' ').next().unwrap().to_string();

        let reader = open_library(owner.into_database(), &config(), Some("bob")).unwrap();
        let joined = output(Commands::Doc(DocCommand::Join { token }), &reader).unwrap();

        assert_eq!(joined, "Joined document 1: Fox (comment)\n");
        let listed = output(Commands::Doc(DocCommand::List), &reader).unwrap();
        assert!(listed.starts_with("1\tFox\tready\tcomment\t"));
    }

    #[test]
    fn revoked_link_cannot_be_joined() {
        let owner = library_as("ada");
        let doc = add_document(&owner, "The quick brown fox");
        let link = owner
            .create_share_link(doc, PermissionLevel::View, Duration::days(1))
            .unwrap();
        output(
            Commands::Doc(DocCommand::Unlink {
                token: link.token.clone(),
            }),
            &owner,
        )
        .unwrap();

        let reader = open_library(owner.into_database(), &config(), Some("bob")).unwrap();
        let err = output(Commands::Doc(DocCommand::Join { token: link.token }), &reader)
            .unwrap_err();

        assert!(is_user_error(&err));
        assert_eq!(err.to_string(), "share link is invalid or has expired");
    }
}
