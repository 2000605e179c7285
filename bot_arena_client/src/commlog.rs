// Binary communication log, consumed by the offline log viewer.
//
// Every session writes a binary record of all server traffic plus AI
// annotations and free-text comments, so a lost game can be replayed and
// analyzed afterwards. Format: an 8-byte magic/version header, then a
// sequence of records:
//
//   { u64 BE microseconds since log open, u8 kind, u32 BE payload length,
//     payload bytes }
//
// Kinds: 4 = inbound data, 5 = outbound data, 6 = per-bot AI annotation
// (payload = one id byte + text), 7 = comment.
//
// A human-readable `.txt` twin and a stdout echo are optional. All writers
// sit behind one mutex — the reader thread, the sender thread, and the
// controller owner all log concurrently.

use std::fs::{self, File};
use std::io::{self, BufWriter, Write};
use std::path::Path;
use std::sync::{Mutex, PoisonError};
use std::time::Instant;

use bot_arena_protocol::types::BotId;

/// Magic + format version at the start of every binary log.
pub const LOG_MAGIC: &[u8; 8] = b"ArnLog\x00\x02";

const KIND_DATA_IN: u8 = 4;
const KIND_DATA_OUT: u8 = 5;
const KIND_AI_NOTE: u8 = 6;
const KIND_COMMENT: u8 = 7;

struct LogFiles {
    bin: BufWriter<File>,
    text: Option<BufWriter<File>>,
}

/// Thread-safe comm-log writer.
pub struct CommLogger {
    echo: bool,
    start: Instant,
    files: Option<Mutex<LogFiles>>,
}

impl CommLogger {
    /// Open log files under `dir` (created if missing). The binary log is
    /// always written; the text twin only when `text_log` is set. `echo`
    /// additionally mirrors traffic to stdout.
    pub fn create(dir: &Path, text_log: bool, echo: bool) -> io::Result<Self> {
        fs::create_dir_all(dir)?;
        let base = chrono::Local::now().format("%Y-%m-%d-%H-%M-%S").to_string();

        let mut bin = BufWriter::new(File::create(dir.join(format!("{base}.abwlog")))?);
        bin.write_all(LOG_MAGIC)?;
        bin.flush()?;

        let text = if text_log {
            Some(BufWriter::new(File::create(
                dir.join(format!("{base}.txt")),
            )?))
        } else {
            None
        };

        Ok(Self {
            echo,
            start: Instant::now(),
            files: Some(Mutex::new(LogFiles { bin, text })),
        })
    }

    /// A logger that writes no files. Stdout echo still works if requested.
    pub fn disabled(echo: bool) -> Self {
        Self {
            echo,
            start: Instant::now(),
            files: None,
        }
    }

    /// Log raw data received from the server.
    pub fn data_in(&self, data: &[u8]) {
        self.log(KIND_DATA_IN, data, " IN", &String::from_utf8_lossy(data));
    }

    /// Log raw data sent to the server.
    pub fn data_out(&self, data: &[u8]) {
        self.log(KIND_DATA_OUT, data, "OUT", &String::from_utf8_lossy(data));
    }

    /// Log an AI annotation for one bot. The binary payload is the bot id
    /// (one byte, the viewer's record layout) followed by the message text.
    /// Ids that do not fit the one-byte field saturate at 255.
    pub fn ai_note(&self, bot_id: BotId, message: &str) {
        let id_byte = u8::try_from(bot_id.0).unwrap_or(u8::MAX);
        let mut payload = Vec::with_capacity(message.len() + 1);
        payload.push(id_byte);
        payload.extend_from_slice(message.as_bytes());
        self.log(KIND_AI_NOTE, &payload, &format!("B#{}", bot_id.0), message);
    }

    /// Log a free-text comment.
    pub fn comment(&self, message: &str) {
        self.log(KIND_COMMENT, message.as_bytes(), " //", message);
    }

    fn log(&self, kind: u8, payload: &[u8], prefix: &str, display: &str) {
        let micros = self.start.elapsed().as_micros() as u64;
        let line = format!(
            "{:9.3} {}: {}{}",
            micros as f64 / 1000.0,
            prefix,
            display,
            if display.ends_with('\n') { "" } else { "\n" }
        );

        if self.echo {
            print!("{line}");
        }

        let Some(files) = &self.files else {
            return;
        };
        let mut files = files.lock().unwrap_or_else(PoisonError::into_inner);

        if let Some(text) = files.text.as_mut() {
            let _ = text.write_all(line.as_bytes());
            let _ = text.flush();
        }

        // Binary record: BE timestamp, kind, BE length, payload. Write
        // failures are swallowed — a full disk must not take the session
        // down with it.
        let bin = &mut files.bin;
        let _ = bin.write_all(&micros.to_be_bytes());
        let _ = bin.write_all(&[kind]);
        let _ = bin.write_all(&(payload.len() as u32).to_be_bytes());
        let _ = bin.write_all(payload);
        let _ = bin.flush();
    }
}
