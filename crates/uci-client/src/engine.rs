//! UCI engine process wrapper (async I/O)

use std::collections::HashSet;
use std::time::Duration;

use async_trait::async_trait;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::{Child, ChildStdin, ChildStdout, Command};
use tokio::time::timeout;
use tracing::{debug, warn};

use crate::error::UciError;
use crate::info::{parse_bestmove, parse_info, Limit, PlayResult, SearchInfo};
use crate::SearchBackend;

/// Grace period for the engine to settle after a `stop`.
const STOP_GRACE: Duration = Duration::from_secs(1);

/// Grace period for the engine to exit after `quit`.
const QUIT_GRACE: Duration = Duration::from_secs(5);

/// A single exclusively-owned UCI engine process.
pub struct UciEngine {
    name: String,
    options: HashSet<String>,
    process: Child,
    stdin: ChildStdin,
    stdout: BufReader<ChildStdout>,
    /// A background `go infinite` is running.
    analysing: bool,
    /// The engine was interrupted and may still owe us output.
    unsettled: bool,
}

impl UciEngine {
    /// Spawn the engine process and run the UCI handshake, collecting the
    /// advertised option names.
    pub async fn spawn(path: &str) -> Result<Self, UciError> {
        let mut process = Command::new(path)
            .stdin(std::process::Stdio::piped())
            .stdout(std::process::Stdio::piped())
            .stderr(std::process::Stdio::null())
            .spawn()
            .map_err(UciError::Spawn)?;

        let stdin = process
            .stdin
            .take()
            .ok_or_else(|| UciError::Protocol("engine stdin unavailable".into()))?;
        let stdout = process
            .stdout
            .take()
            .ok_or_else(|| UciError::Protocol("engine stdout unavailable".into()))?;

        let mut engine = Self {
            name: String::new(),
            options: HashSet::new(),
            process,
            stdin,
            stdout: BufReader::new(stdout),
            analysing: false,
            unsettled: false,
        };

        engine.send("uci").await?;
        loop {
            let line = engine.read_line().await?;
            if line == "uciok" {
                break;
            }
            if let Some(rest) = line.strip_prefix("id name ") {
                engine.name = rest.to_string();
            } else if let Some(name) = parse_option_name(&line) {
                engine.options.insert(name);
            }
        }

        engine.send("isready").await?;
        engine.wait_for("readyok").await?;

        Ok(engine)
    }

    /// Send a command line to the engine.
    async fn send(&mut self, cmd: &str) -> Result<(), UciError> {
        debug!(cmd, "uci <");
        self.stdin.write_all(format!("{cmd}\n").as_bytes()).await?;
        self.stdin.flush().await?;
        Ok(())
    }

    /// Read one trimmed line of engine output.
    async fn read_line(&mut self) -> Result<String, UciError> {
        let mut line = String::new();
        loop {
            line.clear();
            if self.stdout.read_line(&mut line).await? == 0 {
                return Err(UciError::Eof);
            }
            let trimmed = line.trim();
            if trimmed.is_empty() {
                continue;
            }
            debug!(line = trimmed, "uci >");
            return Ok(trimmed.to_string());
        }
    }

    async fn wait_for(&mut self, expected: &str) -> Result<(), UciError> {
        loop {
            if self.read_line().await? == expected {
                return Ok(());
            }
        }
    }

    /// Interrupt any running search and resynchronize on `readyok`.
    ///
    /// A `stop` followed by `isready` is answered after any pending
    /// `bestmove`, so reading up to `readyok` leaves the stream clean. If
    /// the engine does not answer within the grace period it is flagged
    /// unsettled and resynced before the next search.
    async fn interrupt_and_sync(&mut self) -> Result<(), UciError> {
        self.send("stop").await?;
        self.analysing = false;
        self.resync().await
    }

    async fn resync(&mut self) -> Result<(), UciError> {
        self.send("isready").await?;
        match timeout(STOP_GRACE, self.wait_for("readyok")).await {
            Ok(result) => {
                self.unsettled = false;
                result
            }
            Err(_) => {
                warn!("engine did not settle within {STOP_GRACE:?}");
                self.unsettled = true;
                Ok(())
            }
        }
    }

    /// Make sure no search or analysis is running before issuing a new `go`.
    async fn ensure_idle(&mut self) -> Result<(), UciError> {
        if self.analysing {
            self.interrupt_and_sync().await?;
        } else if self.unsettled {
            self.resync().await?;
        }
        Ok(())
    }

    /// Run a `go` and collect diagnostics until `bestmove`.
    async fn run_search(
        &mut self,
        fen: &str,
        limit: &Limit,
    ) -> Result<(String, Option<String>, SearchInfo), UciError> {
        self.ensure_idle().await?;
        self.send(&format!("position fen {fen}")).await?;
        self.send(&limit.to_go_command()).await?;

        let mut info = SearchInfo::default();
        loop {
            let line = self.read_line().await?;
            if line.starts_with("info") && line.contains(" pv ") {
                info = parse_info(&line);
            } else if let Some((best, ponder)) = parse_bestmove(&line) {
                return Ok((best, ponder, info));
            }
        }
    }
}

#[async_trait]
impl SearchBackend for UciEngine {
    fn name(&self) -> &str {
        &self.name
    }

    fn has_option(&self, name: &str) -> bool {
        self.options.contains(name)
    }

    async fn set_option(&mut self, name: &str, value: &str) -> Result<(), UciError> {
        if !self.options.contains(name) {
            return Err(UciError::Protocol(format!("option {name} not supported")));
        }
        self.send(&format!("setoption name {name} value {value}"))
            .await
    }

    async fn play(&mut self, fen: &str, limit: &Limit) -> Result<PlayResult, UciError> {
        let (best_move, ponder, info) = self.run_search(fen, limit).await?;
        if best_move == "(none)" {
            return Err(UciError::Protocol("engine returned no move".into()));
        }
        Ok(PlayResult {
            best_move,
            ponder,
            info,
        })
    }

    async fn analyse(&mut self, fen: &str, limit: &Limit) -> Result<SearchInfo, UciError> {
        let (_, _, info) = self.run_search(fen, limit).await?;
        Ok(info)
    }

    async fn start_analysis(&mut self, fen: &str) -> Result<(), UciError> {
        self.ensure_idle().await?;
        self.send(&format!("position fen {fen}")).await?;
        self.send("go infinite").await?;
        self.analysing = true;
        Ok(())
    }

    async fn stop_analysis(&mut self) -> Result<(), UciError> {
        if !self.analysing {
            return Ok(());
        }
        self.interrupt_and_sync().await
    }

    async fn halt(&mut self) -> Result<(), UciError> {
        self.interrupt_and_sync().await
    }

    async fn quit(&mut self) {
        let _ = self.send("quit").await;
        if timeout(QUIT_GRACE, self.process.wait()).await.is_err() {
            warn!("engine did not quit within {QUIT_GRACE:?}, killing process");
            let _ = self.process.start_kill();
            let _ = self.process.wait().await;
        }
    }
}

impl Drop for UciEngine {
    fn drop(&mut self) {
        // Best-effort synchronous kill in drop
        let _ = self.process.start_kill();
    }
}

/// Extract the option name from an `option name <NAME> type ...` line.
fn parse_option_name(line: &str) -> Option<String> {
    let rest = line.strip_prefix("option name ")?;
    let name = match rest.find(" type ") {
        Some(idx) => &rest[..idx],
        None => rest,
    };
    if name.is_empty() {
        None
    } else {
        Some(name.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_option_name() {
        assert_eq!(
            parse_option_name("option name Hash type spin default 16 min 1 max 33554432"),
            Some("Hash".to_string())
        );
        assert_eq!(
            parse_option_name("option name Skill Level type spin default 20 min 0 max 20"),
            Some("Skill Level".to_string())
        );
        assert_eq!(parse_option_name("id name Stockfish 16"), None);
    }
}
