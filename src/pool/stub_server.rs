//! 테스트용 RESP 서버
//!
//! 받은 명령을 기록하고, 테스트가 넘긴 함수로 응답을 만듭니다.
//! `MULTI`/`EXEC`는 서버가 직접 처리해 큐에 쌓인 응답을 배열로 돌려줍니다.
//! 연결 준비 명령(`CLIENT`, `PING`, `SELECT`, `AUTH`)은 기록하지 않습니다.

use std::io::{self, BufRead, BufReader, Read, Write};
use std::net::{TcpListener, TcpStream};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;

/// 스크립트 응답
#[derive(Debug, Clone, PartialEq)]
pub enum Reply {
    Ok,
    Nil,
    Int(i64),
    Bulk(Vec<u8>),
    Array(Vec<Reply>),
    Error(String),
}

impl Reply {
    pub fn bulk(value: impl AsRef<[u8]>) -> Self {
        Reply::Bulk(value.as_ref().to_vec())
    }

    fn encode(&self, out: &mut Vec<u8>) {
        match self {
            Reply::Ok => out.extend_from_slice(b"+OK\r\n"),
            Reply::Nil => out.extend_from_slice(b"$-1\r\n"),
            Reply::Int(n) => out.extend_from_slice(format!(":{}\r\n", n).as_bytes()),
            Reply::Bulk(bytes) => {
                out.extend_from_slice(format!("${}\r\n", bytes.len()).as_bytes());
                out.extend_from_slice(bytes);
                out.extend_from_slice(b"\r\n");
            }
            Reply::Array(items) => {
                out.extend_from_slice(format!("*{}\r\n", items.len()).as_bytes());
                for item in items {
                    item.encode(out);
                }
            }
            Reply::Error(message) => out.extend_from_slice(format!("-{}\r\n", message).as_bytes()),
        }
    }
}

type Handler = dyn Fn(&[String]) -> Reply + Send + Sync;

pub struct StubServer {
    port: u16,
    commands: Arc<Mutex<Vec<Vec<String>>>>,
    connections: Arc<AtomicUsize>,
}

impl StubServer {
    /// 임의 포트에서 서버를 띄웁니다. 연결마다 스레드 하나가 응답합니다.
    pub fn start<H>(handler: H) -> Self
    where
        H: Fn(&[String]) -> Reply + Send + Sync + 'static,
    {
        let listener = TcpListener::bind("127.0.0.1:0").expect("bind stub server");
        let port = listener.local_addr().expect("stub server address").port();
        let commands = Arc::new(Mutex::new(Vec::new()));
        let connections = Arc::new(AtomicUsize::new(0));
        let handler: Arc<Handler> = Arc::new(handler);

        let recorded = commands.clone();
        let accepted = connections.clone();
        thread::spawn(move || {
            for stream in listener.incoming() {
                let Ok(stream) = stream else { break };
                accepted.fetch_add(1, Ordering::SeqCst);

                let handler = handler.clone();
                let recorded = recorded.clone();
                thread::spawn(move || {
                    let _ = serve(stream, handler.as_ref(), &recorded);
                });
            }
        });

        Self {
            port,
            commands,
            connections,
        }
    }

    pub fn url(&self) -> String {
        format!("redis://127.0.0.1:{}", self.port)
    }

    /// 받은 명령 (준비 명령 제외), 받은 순서대로
    pub fn commands(&self) -> Vec<Vec<String>> {
        self.commands.lock().expect("stub command log poisoned").clone()
    }

    /// 지금까지 수락한 TCP 연결 수
    pub fn connections(&self) -> usize {
        self.connections.load(Ordering::SeqCst)
    }
}

fn serve(stream: TcpStream, handler: &Handler, recorded: &Mutex<Vec<Vec<String>>>) -> io::Result<()> {
    let mut writer = stream.try_clone()?;
    let mut reader = BufReader::new(stream);
    let mut queued: Option<Vec<Reply>> = None;

    while let Some(args) = read_command(&mut reader)? {
        let name = args.first().map(|name| name.to_ascii_uppercase()).unwrap_or_default();
        let mut out = Vec::new();

        match name.as_str() {
            "CLIENT" | "SELECT" | "AUTH" => Reply::Ok.encode(&mut out),
            "PING" => out.extend_from_slice(b"+PONG\r\n"),
            "MULTI" => {
                record(recorded, args);
                queued = Some(Vec::new());
                Reply::Ok.encode(&mut out);
            }
            "EXEC" => {
                record(recorded, args);
                Reply::Array(queued.take().unwrap_or_default()).encode(&mut out);
            }
            _ => {
                let reply = handler(args.as_slice());
                record(recorded, args);
                match queued.as_mut() {
                    Some(replies) => {
                        replies.push(reply);
                        out.extend_from_slice(b"+QUEUED\r\n");
                    }
                    None => reply.encode(&mut out),
                }
            }
        }

        writer.write_all(&out)?;
        writer.flush()?;
    }

    Ok(())
}

fn record(recorded: &Mutex<Vec<Vec<String>>>, args: Vec<String>) {
    recorded.lock().expect("stub command log poisoned").push(args);
}

fn read_command(reader: &mut impl BufRead) -> io::Result<Option<Vec<String>>> {
    let mut line = String::new();
    if reader.read_line(&mut line)? == 0 {
        return Ok(None);
    }
    let count = header(&line, '*')?;

    let mut args = Vec::with_capacity(count);
    for _ in 0..count {
        line.clear();
        reader.read_line(&mut line)?;
        let len = header(&line, '$')?;

        let mut buf = vec![0; len + 2];
        reader.read_exact(&mut buf)?;
        buf.truncate(len);
        args.push(String::from_utf8_lossy(&buf).into_owned());
    }

    Ok(Some(args))
}

fn header(line: &str, prefix: char) -> io::Result<usize> {
    line.trim_end()
        .strip_prefix(prefix)
        .and_then(|n| n.parse().ok())
        .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidData, format!("unexpected RESP line {:?}", line)))
}
