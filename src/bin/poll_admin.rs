//! One-shot admin actions for the poll channel.

use anyhow::{bail, Context as _, Result};
use clap::{Parser, Subcommand};
use dotenvy::dotenv;
use ocb_poll_bot::config::{Settings, CHECK, CHECK_NARROW, POLL_TABLE_MARKER, TABLE_FILE_NAME};
use ocb_poll_bot::logging::init_logging;
use ocb_poll_bot::platform::discord::DiscordPlatform;
use ocb_poll_bot::platform::resilient::send_message_resilient;
use ocb_poll_bot::platform::{ChannelId, ChatPlatform, HistoryOrder, MessageEdit, OutgoingMessage};
use ocb_poll_bot::poll::attendance::AttendanceTable;
use ocb_poll_bot::poll::machine::{clearable_messages, fetch_attendance, find_poll_message};
use ocb_poll_bot::poll::schedule::SystemClock;
use ocb_poll_bot::poll::{PollDeps, PollStateMachine};
use ocb_poll_bot::render::source::HttpImageSource;
use ocb_poll_bot::render::TableRenderer;
use ocb_poll_bot::templates::YamlTemplateStore;
use ocb_poll_bot::utils::truncate_str;
use std::path::{Path, PathBuf};
use std::sync::Arc;

#[derive(Parser)]
#[command(name = "poll_admin", about = "Do some basic admin in the game-night poll channel")]
struct Cli {
    #[command(subcommand)]
    action: Action,
}

#[derive(Subcommand)]
enum Action {
    /// Print the attendance table to stdout
    PrintTable,
    /// Post the attendance table as text in the poll channel, editing the previous one
    PostTable,
    /// Write the attendance table image to a PNG file
    DrawTable {
        #[arg(default_value = TABLE_FILE_NAME)]
        path: PathBuf,
    },
    /// Delete every message in the poll channel except the leading one
    ClearMessages {
        /// Actually delete; without this the messages are only listed
        #[arg(long)]
        yes: bool,
    },
    /// Post a new poll message
    PostPollMessage,
}

struct Admin {
    platform: Arc<dyn ChatPlatform>,
    renderer: Arc<TableRenderer>,
    machine: PollStateMachine,
    poll_channel: ChannelId,
}

impl Admin {
    async fn connect(settings: Settings) -> Result<Self> {
        let platform: Arc<dyn ChatPlatform> = Arc::new(DiscordPlatform::from_token(&settings.token));
        let renderer = Arc::new(TableRenderer::from_settings(
            &settings,
            Arc::new(HttpImageSource::new()?),
        ));
        let deps = PollDeps {
            platform: Arc::clone(&platform),
            templates: Arc::new(YamlTemplateStore::new(settings.template_file.clone())),
            renderer: Arc::clone(&renderer),
            clock: Arc::new(SystemClock),
        };
        let (mut machine, _handle) = PollStateMachine::new(settings, deps);
        let (poll_channel, _dump) = machine
            .prepare()
            .await
            .context("could not find the configured guild or channels - check the configuration")?;

        Ok(Self {
            platform,
            renderer,
            machine,
            poll_channel,
        })
    }

    async fn attendance(&self) -> Result<AttendanceTable> {
        let Some(poll) = find_poll_message(self.platform.as_ref(), self.poll_channel).await? else {
            bail!("Could not find any valid poll message");
        };
        println!("Reading reactions from this message:\n{}\n", poll.content);
        Ok(fetch_attendance(self.platform.as_ref(), self.poll_channel, poll.id).await?)
    }

    async fn print_table(&self) -> Result<()> {
        let table = self.attendance().await?;
        println!("Here's how it breaks down:");
        println!("{}", self.renderer.render_text(&table, CHECK));
        Ok(())
    }

    async fn post_table(&self) -> Result<()> {
        let table = self.attendance().await?;
        let text = format!(
            "{POLL_TABLE_MARKER}\n```\n{}\n```",
            self.renderer.render_text(&table, CHECK_NARROW)
        );

        let history = self
            .platform
            .channel_history(self.poll_channel, HistoryOrder::NewestFirst)
            .await?;
        match history
            .iter()
            .find(|m| m.content.starts_with(POLL_TABLE_MARKER))
        {
            Some(previous) => {
                println!("Updating old poll table");
                self.platform
                    .edit_message(self.poll_channel, previous.id, MessageEdit::Content(text))
                    .await?;
            }
            None => {
                println!("Posting new poll table");
                send_message_resilient(
                    self.platform.as_ref(),
                    self.poll_channel,
                    OutgoingMessage::text(text),
                )
                .await?;
            }
        }
        Ok(())
    }

    async fn draw_table(&self, path: &Path) -> Result<()> {
        let table = self.attendance().await?;
        let png = self.renderer.render_png(&table).await?;
        tokio::fs::write(path, &png)
            .await
            .with_context(|| format!("failed to write {}", path.display()))?;
        println!("Wrote {}", path.display());
        Ok(())
    }

    async fn clear_messages(&self, confirmed: bool) -> Result<()> {
        let messages = clearable_messages(self.platform.as_ref(), self.poll_channel).await?;
        if messages.is_empty() {
            println!("There are no messages for me to delete");
            return Ok(());
        }

        println!("These messages would be IRREVERSIBLY DELETED:");
        for message in &messages {
            let first_line = message.content.lines().next().unwrap_or_default();
            println!("  {} | {}", message.id, truncate_str(first_line, 80));
        }
        if !confirmed {
            println!("Re-run with --yes to delete them");
            return Ok(());
        }

        for message in &messages {
            self.platform
                .delete_message(self.poll_channel, message.id)
                .await?;
        }
        println!("Deleted {} messages", messages.len());
        Ok(())
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenv().ok();
    let cli = Cli::parse();
    let settings = Settings::new().context("failed to load configuration")?;
    init_logging(&settings.log_level)?;

    let mut admin = Admin::connect(settings).await?;
    match cli.action {
        Action::PrintTable => admin.print_table().await?,
        Action::PostTable => admin.post_table().await?,
        Action::DrawTable { path } => admin.draw_table(&path).await?,
        Action::ClearMessages { yes } => admin.clear_messages(yes).await?,
        Action::PostPollMessage => {
            let id = admin.machine.create_poll().await?;
            println!("Posted poll message {id}");
        }
    }
    println!("Done! Have a nice day 😊");
    Ok(())
}
