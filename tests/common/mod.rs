#![allow(dead_code)]

use std::sync::{Arc, Mutex};
use std::time::Duration;

use gxlink::protocol::BLOCK_WIRE_SIZE;
use gxlink::{ChunkFrame, ConnectOptions};
use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::{TcpListener, TcpStream};

pub fn options() -> ConnectOptions {
    ConnectOptions {
        connect_timeout: Duration::from_secs(1),
        idle_timeout: Duration::from_secs(5),
        max_attempts: 1,
        retry_delay: Duration::from_millis(10),
    }
}

pub async fn bind() -> (TcpListener, String) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap().to_string();
    (listener, addr)
}

#[derive(Debug, Clone, PartialEq)]
pub enum Received {
    Text(String),
    Block(ChunkFrame),
}

pub type Log = Arc<Mutex<Vec<Received>>>;

pub fn texts(log: &Log) -> Vec<String> {
    log.lock()
        .unwrap()
        .iter()
        .filter_map(|r| match r {
            Received::Text(t) => Some(t.clone()),
            Received::Block(_) => None,
        })
        .collect()
}

/// Printer side of one connection
pub struct Wire {
    reader: BufReader<OwnedReadHalf>,
    writer: OwnedWriteHalf,
}

impl Wire {
    pub fn new(stream: TcpStream) -> Self {
        let (reader, writer) = stream.into_split();
        Self {
            reader: BufReader::new(reader),
            writer,
        }
    }

    pub async fn accept(listener: &TcpListener) -> Self {
        let (stream, _) = listener.accept().await.unwrap();
        Self::new(stream)
    }

    /// Next `~...\r\n` command without prefix and suffix; `None` on EOF.
    pub async fn read_command(&mut self) -> Option<String> {
        let mut line = String::new();
        match self.reader.read_line(&mut line).await {
            Ok(0) | Err(_) => None,
            Ok(_) => Some(line.trim_end().trim_start_matches('~').to_string()),
        }
    }

    pub async fn read_block(&mut self) -> Option<ChunkFrame> {
        let mut buf = vec![0u8; BLOCK_WIRE_SIZE];
        self.reader.read_exact(&mut buf).await.ok()?;
        Some(ChunkFrame::decode(&buf).unwrap())
    }

    pub async fn send(&mut self, text: &str) {
        let _ = self.writer.write_all(text.as_bytes()).await;
    }

    pub async fn accept_session(&mut self) {
        assert_eq!(self.read_command().await.as_deref(), Some("M601 S1"));
        self.send(&canned_reply("M601 S1")).await;
    }

    /// True if the client sends nothing for `d`.
    pub async fn quiet_for(&mut self, d: Duration) -> bool {
        if !self.reader.buffer().is_empty() {
            return false;
        }
        match tokio::time::timeout(d, self.reader.fill_buf()).await {
            Err(_) => true,
            Ok(Ok(buf)) => buf.is_empty(),
            Ok(Err(_)) => true,
        }
    }
}

pub fn canned_reply(cmd: &str) -> String {
    let body = match cmd {
        "M601 S1" => "CMD M601 Received.\r\nControl Success.\r\n".to_string(),
        "M115" => concat!(
            "CMD M115 Received.\r\n",
            "Machine Type: FlashForge Finder\r\n",
            "Machine Name: bench\r\n",
            "Firmware: v2.2.4\r\n",
            "X: 140 Y: 140 Z: 140\r\n",
            "Tool Count: 1\r\n",
        )
        .to_string(),
        "M119" => concat!(
            "CMD M119 Received.\r\n",
            "Endstop: X-max:1 Y-max:0 Z-min:0\r\n",
            "MachineStatus: READY\r\n",
            "MoveMode: READY\r\n",
            "Status: S:1 L:0 J:0 F:0\r\n",
        )
        .to_string(),
        "M27" => "CMD M27 Received.\r\nSD printing byte 25/200\r\n".to_string(),
        "M105" => "CMD M105 Received.\r\nT0:210 /215 B:60 /60\r\n".to_string(),
        other => {
            let code = other.split(' ').next().unwrap_or(other);
            format!("CMD {} Received.\r\n", code)
        }
    };
    format!("{}ok\r\n", body)
}

/// Answers every command and accepts file blocks until the client hangs up.
pub async fn serve(mut wire: Wire, log: Log) {
    wire.accept_session().await;
    let mut pending_bytes = 0usize;

    loop {
        if pending_bytes > 0 {
            let Some(frame) = wire.read_block().await else { return };
            pending_bytes = pending_bytes.saturating_sub(frame.length as usize);
            log.lock().unwrap().push(Received::Block(frame));
            wire.send("ok\r\n").await;
            continue;
        }

        let Some(cmd) = wire.read_command().await else { return };
        if let Some(rest) = cmd.strip_prefix("M28 ") {
            pending_bytes = rest.split(' ').next().unwrap().parse().unwrap();
        }
        log.lock().unwrap().push(Received::Text(cmd.clone()));
        wire.send(&canned_reply(&cmd)).await;
    }
}

/// A printer that serves a single connection.
pub async fn spawn_printer() -> (String, Log) {
    let (listener, addr) = bind().await;
    let log: Log = Arc::default();
    let server_log = Arc::clone(&log);
    tokio::spawn(async move {
        let wire = Wire::accept(&listener).await;
        serve(wire, server_log).await;
    });
    (addr, log)
}

pub async fn wait_for<F: Fn() -> bool>(cond: F) {
    for _ in 0..200 {
        if cond() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("condition not reached");
}
