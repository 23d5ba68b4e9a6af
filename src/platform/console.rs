// ABOUTME: Local console platform reading commands from stdin and printing replies
// ABOUTME: Lets the bot run end to end without a chat service

use anyhow::{Context, Result};
use async_trait::async_trait;
use scopebot_core::config::ConsoleConfig;
use scopebot_core::reply::split_message;
use scopebot_core::{
    Capability, Classification, EventStream, InboundEvent, MessageHandle, PlaceClassifier,
    Platform, PlatformAdapter, Reply,
};
use std::io::Write;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;
use tokio_stream::wrappers::UnboundedReceiverStream;

type Input = Box<dyn AsyncBufRead + Send + Unpin>;
type Output = Box<dyn Write + Send>;

/// Prefix for identifiers the console treats as threads
const THREAD_PREFIX: &str = "thread:";

pub struct ConsoleAdapter {
    platform: Platform,
    config: ConsoleConfig,
    admins: Vec<String>,
    input: Mutex<Option<Input>>,
    output: Mutex<Output>,
    next_message_id: AtomicU64,
}

impl ConsoleAdapter {
    /// Console wired to the process's stdin and stdout
    pub fn new(config: ConsoleConfig, admins: Vec<String>) -> Result<Self> {
        Self::with_io(
            config,
            admins,
            Box::new(BufReader::new(tokio::io::stdin())),
            Box::new(std::io::stdout()),
        )
    }

    pub fn with_io(
        config: ConsoleConfig,
        admins: Vec<String>,
        input: Input,
        output: Output,
    ) -> Result<Self> {
        let platform = Platform::new(config.platform.as_str())
            .with_context(|| format!("Invalid console platform name: {}", config.platform))?;
        Ok(Self {
            platform,
            config,
            admins,
            input: Mutex::new(Some(input)),
            output: Mutex::new(output),
            next_message_id: AtomicU64::new(1),
        })
    }

    fn event_for(&self, line: String) -> InboundEvent {
        InboundEvent {
            platform: self.platform.clone(),
            message_id: String::new(),
            user_id: self.config.user_id.clone(),
            user_name: self.config.user_name.clone(),
            channel_id: self.config.channel_id.clone(),
            guild_id: self.config.guild_id.clone(),
            text: line,
        }
    }

    fn write_lines(&self, prefix: &str, text: &str) -> Result<()> {
        let mut out = self
            .output
            .lock()
            .map_err(|_| anyhow::anyhow!("console output lock poisoned"))?;
        for part in split_message(text, self.config.max_message_len) {
            writeln!(out, "{}{}", prefix, part).context("Failed to write to console")?;
        }
        out.flush().context("Failed to flush console")?;
        Ok(())
    }
}

#[async_trait]
impl PlaceClassifier for ConsoleAdapter {
    async fn classify(&self, native_id: &str) -> Result<Classification> {
        if native_id.starts_with(THREAD_PREFIX) {
            return Ok(Classification::Thread);
        }
        if native_id == self.config.channel_id {
            return Ok(Classification::Channel {
                channel_id: native_id.to_string(),
                guild_id: self.config.guild_id.clone(),
            });
        }
        if !native_id.is_empty() && native_id == self.config.guild_id {
            return Ok(Classification::Guild {
                guild_id: native_id.to_string(),
            });
        }
        for (guild, channels) in &self.config.guilds {
            if guild == native_id {
                return Ok(Classification::Guild {
                    guild_id: guild.clone(),
                });
            }
            if channels.iter().any(|c| c == native_id) {
                return Ok(Classification::Channel {
                    channel_id: native_id.to_string(),
                    guild_id: guild.clone(),
                });
            }
        }
        Ok(Classification::Unrecognized)
    }
}

#[async_trait]
impl PlatformAdapter for ConsoleAdapter {
    fn platform(&self) -> &Platform {
        &self.platform
    }

    fn capability(&self) -> Capability {
        Capability::PlainText
    }

    fn is_admin(&self, user_id: &str) -> bool {
        self.admins.iter().any(|a| a == user_id)
    }

    async fn event_stream(&self) -> Result<EventStream> {
        let mut input = self
            .input
            .lock()
            .map_err(|_| anyhow::anyhow!("console input lock poisoned"))?
            .take()
            .context("Console event stream already taken")?;

        let (tx, rx) = mpsc::unbounded_channel();
        let template = self.event_for(String::new());
        tokio::spawn(async move {
            let mut line = String::new();
            loop {
                line.clear();
                match input.read_line(&mut line).await {
                    Ok(0) => break,
                    Ok(_) => {
                        let text = line.trim_end_matches(['\r', '\n']).to_string();
                        if text.trim().is_empty() {
                            continue;
                        }
                        let event = InboundEvent {
                            text,
                            ..template.clone()
                        };
                        if tx.send(event).is_err() {
                            break;
                        }
                    }
                    Err(e) => {
                        tracing::warn!(error = %e, "Failed to read console input");
                        break;
                    }
                }
            }
            tracing::debug!("Console input closed");
        });

        Ok(Box::pin(UnboundedReceiverStream::new(rx)))
    }

    async fn send(
        &self,
        origin: &InboundEvent,
        reply: &Reply,
        is_error: bool,
    ) -> Result<MessageHandle> {
        let id = self.next_message_id.fetch_add(1, Ordering::Relaxed);
        let prefix = if is_error {
            format!("[{}] error: ", id)
        } else {
            format!("[{}] ", id)
        };
        self.write_lines(&prefix, &reply.to_plain())?;
        Ok(MessageHandle {
            platform: self.platform.clone(),
            channel_id: origin.channel_id.clone(),
            message_id: id.to_string(),
        })
    }

    async fn edit(&self, handle: &MessageHandle, reply: &Reply) -> Result<()> {
        self.write_lines(&format!("[{} edited] ", handle.message_id), &reply.to_plain())
    }

    fn supports_edit(&self) -> bool {
        true
    }
}
