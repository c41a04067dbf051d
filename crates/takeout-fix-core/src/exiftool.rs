//! Tag writing through a long-lived `exiftool -stay_open` process.

use std::io::{self, BufRead, BufReader, Read, Write};
use std::path::{Path, PathBuf};
use std::process::{Child, ChildStdin, Command, Stdio};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::sync::Mutex;
use std::thread;
use std::time::{Duration, Instant};

use crate::error::FixError;
use crate::tags::{TagMap, TagWriter};

/// Arguments sent with every write request.
const WRITE_ARGS: &[&str] = &[
    "-overwrite_original",
    "-m",
    "-E",
    "-charset",
    "filename=utf8",
    "-api",
    "LargeFileSupport=1",
];

const SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

enum Line {
    Out(String),
    Err(String),
}

#[derive(Debug, Default)]
struct Response {
    stdout: Vec<String>,
    stderr: Vec<String>,
}

struct Session {
    child: Child,
    stdin: ChildStdin,
    lines: Receiver<Line>,
    seq: u64,
}

fn forward<R: Read + Send + 'static>(
    name: &str,
    stream: R,
    tx: Sender<Line>,
    wrap: fn(String) -> Line,
) -> io::Result<()> {
    thread::Builder::new().name(name.to_string()).spawn(move || {
        for line in BufReader::new(stream).lines().map_while(Result::ok) {
            if tx.send(wrap(line)).is_err() {
                break;
            }
        }
    })?;
    Ok(())
}

impl Session {
    fn spawn(program: &Path) -> io::Result<Self> {
        let mut child = Command::new(program)
            .args(["-stay_open", "True", "-@", "-"])
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()?;
        let stdin = child.stdin.take().ok_or_else(|| io::Error::other("exiftool stdin unavailable"))?;
        let stdout = child.stdout.take().ok_or_else(|| io::Error::other("exiftool stdout unavailable"))?;
        let stderr = child.stderr.take().ok_or_else(|| io::Error::other("exiftool stderr unavailable"))?;

        let (tx, rx) = mpsc::channel();
        forward("exiftool-stdout", stdout, tx.clone(), Line::Out)?;
        forward("exiftool-stderr", stderr, tx, Line::Err)?;

        tracing::debug!(pid = child.id(), "started exiftool");
        Ok(Self {
            child,
            stdin,
            lines: rx,
            seq: 0,
        })
    }

    /// Run one request and wait for its `{readyN}` markers on both streams.
    fn execute(&mut self, args: &[String], timeout: Duration) -> Result<Response, FixError> {
        self.seq += 1;
        let marker = format!("{{ready{}}}", self.seq);

        let mut request = String::new();
        for arg in args {
            request.push_str(arg);
            request.push('\n');
        }
        request.push_str(&format!("-echo4\n{}\n-execute{}\n", marker, self.seq));
        self.stdin.write_all(request.as_bytes())?;
        self.stdin.flush()?;

        let deadline = Instant::now() + timeout;
        let mut response = Response::default();
        let (mut out_done, mut err_done) = (false, false);
        while !(out_done && err_done) {
            let remaining = deadline.saturating_duration_since(Instant::now());
            match self.lines.recv_timeout(remaining) {
                Ok(Line::Out(line)) if line.trim() == marker => out_done = true,
                Ok(Line::Err(line)) if line.trim() == marker => err_done = true,
                Ok(Line::Out(line)) => response.stdout.push(line),
                Ok(Line::Err(line)) => {
                    tracing::debug!(target: "exiftool", "{}", line);
                    response.stderr.push(line);
                }
                Err(RecvTimeoutError::Timeout) => return Err(FixError::Timeout(timeout.as_secs())),
                Err(RecvTimeoutError::Disconnected) => {
                    return Err(FixError::ToolUnavailable("exiftool exited unexpectedly".into()))
                }
            }
        }
        Ok(response)
    }

    fn shutdown(mut self) {
        let _ = self.stdin.write_all(b"-stay_open\nFalse\n");
        let _ = self.stdin.flush();
        let deadline = Instant::now() + SHUTDOWN_GRACE;
        while Instant::now() < deadline {
            if let Ok(Some(_)) = self.child.try_wait() {
                tracing::debug!("exiftool exited");
                return;
            }
            thread::sleep(Duration::from_millis(50));
        }
        self.kill();
    }

    fn kill(mut self) {
        tracing::warn!(pid = self.child.id(), "killing exiftool");
        let _ = self.child.kill();
        let _ = self.child.wait();
    }
}

/// Shared exiftool handle. Requests are queued on a mutex and answered by a
/// single process; a process that hangs past the timeout is killed and a
/// fresh one is started for the next request.
pub struct ExifTool {
    program: PathBuf,
    timeout: Duration,
    session: Mutex<Option<Session>>,
}

impl ExifTool {
    /// Start the process and check that it answers.
    pub fn start(program: impl Into<PathBuf>, timeout: Duration) -> Result<Self, FixError> {
        let program = program.into();
        let session = Session::spawn(&program)
            .map_err(|e| FixError::ToolUnavailable(format!("{}: {}", program.display(), e)))?;
        let tool = Self {
            program,
            timeout,
            session: Mutex::new(Some(session)),
        };
        let version = tool.version()?;
        tracing::info!("using exiftool {}", version);
        Ok(tool)
    }

    pub fn version(&self) -> Result<String, FixError> {
        let response = self.request(&["-ver".to_string()])?;
        response
            .stdout
            .first()
            .map(|v| v.trim().to_string())
            .ok_or_else(|| FixError::ToolUnavailable("no version reported".into()))
    }

    /// Ask the process to exit and wait for it.
    pub fn close(self) {
        drop(self);
    }

    fn request(&self, args: &[String]) -> Result<Response, FixError> {
        let mut guard = self
            .session
            .lock()
            .map_err(|_| FixError::ToolUnavailable("exiftool handle poisoned".into()))?;
        let mut session = match guard.take() {
            Some(s) => s,
            None => Session::spawn(&self.program)
                .map_err(|e| FixError::ToolUnavailable(format!("{}: {}", self.program.display(), e)))?,
        };
        match session.execute(args, self.timeout) {
            Ok(response) => {
                *guard = Some(session);
                Ok(response)
            }
            Err(e) => {
                session.kill();
                Err(e)
            }
        }
    }
}

impl TagWriter for ExifTool {
    fn write_tags(&self, path: &Path, tags: &TagMap) -> Result<(), FixError> {
        if tags.is_empty() {
            return Ok(());
        }
        let args = build_args(path, tags)?;
        let response = self.request(&args)?;
        check_response(&response)
    }
}

impl Drop for ExifTool {
    fn drop(&mut self) {
        let session = match self.session.get_mut() {
            Ok(s) => s.take(),
            Err(poisoned) => poisoned.into_inner().take(),
        };
        if let Some(session) = session {
            session.shutdown();
        }
    }
}

/// Escape a value for `-E`, which lets newlines travel through the
/// line-based argument stream.
fn escape_value(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '\n' => out.push_str("&#xa;"),
            '\r' => {}
            c => out.push(c),
        }
    }
    out
}

fn build_args(path: &Path, tags: &TagMap) -> Result<Vec<String>, FixError> {
    let target = path.to_string_lossy();
    if target.contains('\n') {
        return Err(FixError::TagWrite(format!("unsupported file name: {}", path.display())));
    }
    let mut args: Vec<String> = WRITE_ARGS.iter().map(|a| a.to_string()).collect();
    for (tag, value) in tags.iter() {
        args.push(format!("-{}={}", tag, escape_value(value)));
    }
    args.push(target.into_owned());
    Ok(args)
}

fn check_response(response: &Response) -> Result<(), FixError> {
    let error = response
        .stderr
        .iter()
        .map(|l| l.trim())
        .find(|l| l.starts_with("Error"));
    let failed = response
        .stdout
        .iter()
        .any(|l| l.contains("weren't updated due to errors"));
    match (error, failed) {
        (Some(msg), _) => Err(FixError::TagWrite(msg.to_string())),
        (None, true) => Err(FixError::TagWrite("file not updated".into())),
        (None, false) => Ok(()),
    }
}
