use std::{
    io::SeekFrom,
    path::{Path, PathBuf},
    time::Duration,
};

use async_trait::async_trait;
use tokio::io::{AsyncBufReadExt, AsyncSeekExt, BufReader};

use crate::{
    error::TailError,
    launcher::ProcessHandle,
    progress::{LifecycleEvent, ProgressSink},
};

pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(1);

const PROGRESS_MARKER: &str = "progress:";
const COMPLETION_MARKER: &str = "success! app";
const UP_TO_DATE_MARKER: &str = "already up to date";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UpdatePhase {
    Initializing,
    Downloading,
    VerifyingInstall,
    VerifyingUpdate,
    Reconfiguring,
    Preallocating,
    Committing,
    Complete,
    AlreadyUpToDate,
}

impl UpdatePhase {
    pub fn label(self) -> &'static str {
        match self {
            UpdatePhase::Initializing => "Initializing",
            UpdatePhase::Downloading => "Downloading",
            UpdatePhase::VerifyingInstall => "Verifying Install",
            UpdatePhase::VerifyingUpdate => "Verifying Update",
            UpdatePhase::Reconfiguring => "Reconfiguring",
            UpdatePhase::Preallocating => "Preallocating",
            UpdatePhase::Committing => "Committing",
            UpdatePhase::Complete => "Complete",
            UpdatePhase::AlreadyUpToDate => "Already Up To Date",
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, UpdatePhase::Complete | UpdatePhase::AlreadyUpToDate)
    }
}

// Checked in order; the first hit wins.
const PHASE_MARKERS: [(&str, UpdatePhase); 6] = [
    ("update state (0x61) downloading", UpdatePhase::Downloading),
    ("update state (0x5) verifying install", UpdatePhase::VerifyingInstall),
    ("update state (0x81) verifying update", UpdatePhase::VerifyingUpdate),
    ("update state (0x3) reconfiguring", UpdatePhase::Reconfiguring),
    ("update state (0x11) preallocating", UpdatePhase::Preallocating),
    ("update state (0x101) committing", UpdatePhase::Committing),
];

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PhaseReading {
    pub phase: UpdatePhase,
    pub percent: Option<f64>,
}

/// What one log line says about the update.
#[derive(Debug, Default, Clone, Copy, PartialEq)]
pub struct LineReading {
    pub progress: Option<PhaseReading>,
    /// `Complete` or `AlreadyUpToDate` when the line carries the success marker.
    pub completion: Option<UpdatePhase>,
}

/// Percentage after the `progress:` marker; 0 when absent or unparsable.
pub fn parse_progress(line: &str) -> f64 {
    line.split_once(PROGRESS_MARKER)
        .and_then(|(_, rest)| rest.split_whitespace().next())
        .and_then(|token| token.parse::<f64>().ok())
        .filter(|v| v.is_finite())
        .map(|v| v.clamp(0.0, 100.0))
        .unwrap_or(0.0)
}

pub fn classify_line(line: &str) -> LineReading {
    let line = line.trim().to_lowercase();

    let progress = PHASE_MARKERS
        .iter()
        .find(|(marker, _)| line.contains(marker))
        .map(|&(_, phase)| PhaseReading {
            phase,
            percent: match phase {
                UpdatePhase::Reconfiguring => None,
                _ => Some(parse_progress(&line)),
            },
        });

    let completion = line.contains(COMPLETION_MARKER).then(|| {
        if line.contains(UP_TO_DATE_MARKER) {
            UpdatePhase::AlreadyUpToDate
        } else {
            UpdatePhase::Complete
        }
    });

    LineReading {
        progress,
        completion,
    }
}

/// Capability to read the next complete line of a growing log.
#[async_trait]
pub trait LineSource: Send {
    /// `Ok(None)` when nothing new has been written yet.
    async fn next_line(&mut self) -> Result<Option<String>, TailError>;

    /// Trailing text whose newline never arrived. Only asked for once the
    /// writer has exited and everything else has been read.
    fn take_unterminated(&mut self) -> Option<String> {
        None
    }
}

/// Reads lines appended to a file after it was opened.
#[derive(Debug)]
pub struct FileLineSource {
    reader: BufReader<tokio::fs::File>,
    // Bytes of a line whose newline has not been written yet.
    partial: Vec<u8>,
}

impl FileLineSource {
    /// Opens `path` positioned at its current end; earlier content is skipped.
    pub async fn open_at_end(path: &Path) -> Result<Self, TailError> {
        let open_err = |source: std::io::Error| TailError::Open {
            path: PathBuf::from(path),
            source,
        };
        let mut file = tokio::fs::File::open(path).await.map_err(open_err)?;
        file.seek(SeekFrom::End(0)).await.map_err(open_err)?;
        Ok(Self {
            reader: BufReader::new(file),
            partial: Vec::new(),
        })
    }
}

#[async_trait]
impl LineSource for FileLineSource {
    async fn next_line(&mut self) -> Result<Option<String>, TailError> {
        let n = self
            .reader
            .read_until(b'\n', &mut self.partial)
            .await
            .map_err(TailError::Read)?;
        if n == 0 || self.partial.last() != Some(&b'\n') {
            return Ok(None);
        }

        Ok(Some(take_line(&mut self.partial)))
    }

    fn take_unterminated(&mut self) -> Option<String> {
        if self.partial.is_empty() {
            return None;
        }
        Some(take_line(&mut self.partial))
    }
}

fn take_line(buf: &mut Vec<u8>) -> String {
    let raw = std::mem::take(buf);
    String::from_utf8_lossy(&raw)
        .trim_end_matches(['\r', '\n'])
        .to_string()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TailEnd {
    Completed { already_up_to_date: bool },
    /// The update process exited and no success marker was ever written.
    ProcessExitedQuietly,
}

/// Follows `source` and reports update phases until completion, or until the
/// process behind `handle` exits and its remaining output is drained.
///
/// The loop suspends for `poll_interval` whenever no line is ready; dropping
/// the future stops it at that point.
pub async fn tail(
    source: &mut dyn LineSource,
    handle: &mut ProcessHandle,
    poll_interval: Duration,
    sink: &dyn ProgressSink,
) -> Result<TailEnd, TailError> {
    let mut current = UpdatePhase::Initializing;
    sink.emit(LifecycleEvent::UpdatePhase {
        phase: current,
        percent: Some(0.0),
    })
    .await;

    let mut exited = false;
    loop {
        let line = match source.next_line().await? {
            Some(line) => line,
            None if exited => {
                // The last write may lack its newline.
                let Some(rest) = source.take_unterminated() else {
                    tracing::info!(pid = ?handle.pid(), last_phase = ?current, "update process exited without completion marker");
                    return Ok(TailEnd::ProcessExitedQuietly);
                };
                rest
            }
            None => {
                if handle.is_alive() {
                    tokio::time::sleep(poll_interval).await;
                } else {
                    // Drain whatever was written before the exit.
                    exited = true;
                }
                continue;
            }
        };

        let reading = classify_line(&line);
        if let Some(PhaseReading { phase, percent }) = reading.progress {
            if phase != current {
                tracing::info!(?phase, "update phase");
            }
            current = phase;
            sink.emit(LifecycleEvent::UpdatePhase { phase, percent }).await;
        }

        if let Some(phase) = reading.completion {
            tracing::info!(?phase, "update finished");
            sink.emit(LifecycleEvent::UpdatePhase {
                phase,
                percent: None,
            })
            .await;
            return Ok(TailEnd::Completed {
                already_up_to_date: phase == UpdatePhase::AlreadyUpToDate,
            });
        }
    }
}

/// [`tail`] over a log file, starting from its current end.
pub async fn tail_file(
    path: &Path,
    handle: &mut ProcessHandle,
    poll_interval: Duration,
    sink: &dyn ProgressSink,
) -> Result<TailEnd, TailError> {
    let mut source = FileLineSource::open_at_end(path).await?;
    tail(&mut source, handle, poll_interval, sink).await
}

#[cfg(test)]
mod tests {
    use std::{
        collections::VecDeque,
        io::Write,
        sync::atomic::Ordering,
    };

    use super::*;
    use crate::testing::{RecordingSink, ScriptedChild};

    /// `None` entries stand for "nothing written yet".
    struct ScriptedSource(VecDeque<Option<String>>);

    impl ScriptedSource {
        fn new(lines: &[Option<&str>]) -> Self {
            Self(lines.iter().map(|l| l.map(str::to_string)).collect())
        }
    }

    #[async_trait]
    impl LineSource for ScriptedSource {
        async fn next_line(&mut self) -> Result<Option<String>, TailError> {
            Ok(self.0.pop_front().flatten())
        }
    }

    fn phases(sink: &RecordingSink) -> Vec<(UpdatePhase, Option<f64>)> {
        sink.events()
            .into_iter()
            .filter_map(|e| match e {
                LifecycleEvent::UpdatePhase { phase, percent } => Some((phase, percent)),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn downloading_line_carries_percent() {
        let r = classify_line(
            " Update state (0x61) downloading, progress: 37.50 (1048576 / 2796202)",
        );
        assert_eq!(
            r.progress,
            Some(PhaseReading {
                phase: UpdatePhase::Downloading,
                percent: Some(37.5)
            })
        );
        assert_eq!(r.completion, None);
    }

    #[test]
    fn reconfiguring_has_no_percent() {
        let r = classify_line("Update state (0x3) reconfiguring, progress: 0.00 (0 / 0)");
        assert_eq!(
            r.progress,
            Some(PhaseReading {
                phase: UpdatePhase::Reconfiguring,
                percent: None
            })
        );
    }

    #[test]
    fn malformed_progress_defaults_to_zero() {
        assert_eq!(parse_progress("update state (0x5) verifying install, progress: abc"), 0.0);
        assert_eq!(parse_progress("update state (0x5) verifying install"), 0.0);
        assert_eq!(parse_progress("progress: nan"), 0.0);
        assert_eq!(parse_progress("progress: 150"), 100.0);
    }

    #[test]
    fn completion_marker_variants() {
        let done = classify_line("Success! App '896660' fully installed.");
        assert_eq!(done.completion, Some(UpdatePhase::Complete));
        assert_eq!(done.progress, None);

        let same = classify_line("Success! App '896660' already up to date.");
        assert_eq!(same.completion, Some(UpdatePhase::AlreadyUpToDate));
    }

    #[test]
    fn unrelated_lines_say_nothing() {
        assert_eq!(classify_line("Loading Steam API...OK"), LineReading::default());
    }

    #[tokio::test(start_paused = true)]
    async fn phases_are_reported_until_success() {
        let mut source = ScriptedSource::new(&[
            Some("Update state (0x61) downloading, progress: 37.5 (1 / 3)"),
            None,
            Some("Update state (0x101) committing, progress: 80.00 (8 / 10)"),
            // Tools revisit phases; any order is accepted.
            Some("Update state (0x61) downloading, progress: 99.0 (9 / 10)"),
            Some("Success! App '896660' fully installed."),
        ]);
        let (child, _exit) = ScriptedChild::running();
        let mut handle = ProcessHandle::new(Some(3), child);
        let sink = RecordingSink::default();

        let end = tail(&mut source, &mut handle, DEFAULT_POLL_INTERVAL, &sink)
            .await
            .unwrap();

        assert_eq!(
            end,
            TailEnd::Completed {
                already_up_to_date: false
            }
        );
        assert_eq!(
            phases(&sink),
            vec![
                (UpdatePhase::Initializing, Some(0.0)),
                (UpdatePhase::Downloading, Some(37.5)),
                (UpdatePhase::Committing, Some(80.0)),
                (UpdatePhase::Downloading, Some(99.0)),
                (UpdatePhase::Complete, None),
            ]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn already_up_to_date_ends_the_tail() {
        let mut source = ScriptedSource::new(&[Some("Success! App '380870' already up to date.")]);
        let (child, _exit) = ScriptedChild::running();
        let mut handle = ProcessHandle::new(None, child);
        let sink = RecordingSink::default();

        let end = tail(&mut source, &mut handle, DEFAULT_POLL_INTERVAL, &sink)
            .await
            .unwrap();
        assert_eq!(
            end,
            TailEnd::Completed {
                already_up_to_date: true
            }
        );
    }

    #[tokio::test(start_paused = true)]
    async fn quiet_exit_is_reported_after_draining() {
        let mut source = ScriptedSource::new(&[
            Some("Update state (0x5) verifying install, progress: n/a"),
            None,
            None,
        ]);
        let (child, exit) = ScriptedChild::running();
        let mut handle = ProcessHandle::new(Some(3), child);
        let sink = RecordingSink::default();

        let flip = tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(5)).await;
            exit.store(true, Ordering::SeqCst);
        });

        let end = tail(&mut source, &mut handle, DEFAULT_POLL_INTERVAL, &sink)
            .await
            .unwrap();
        flip.await.unwrap();

        assert_eq!(end, TailEnd::ProcessExitedQuietly);
        assert_eq!(
            phases(&sink),
            vec![
                (UpdatePhase::Initializing, Some(0.0)),
                (UpdatePhase::VerifyingInstall, Some(0.0)),
            ]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn output_written_before_exit_still_counts() {
        // Exit is noticed on the first empty read; the drain then finds the marker.
        let mut source = ScriptedSource::new(&[None, Some("Success! App '1' fully installed.")]);
        let mut handle = ProcessHandle::new(Some(3), ScriptedChild::exited());
        let sink = RecordingSink::default();

        let end = tail(&mut source, &mut handle, DEFAULT_POLL_INTERVAL, &sink)
            .await
            .unwrap();
        assert_eq!(
            end,
            TailEnd::Completed {
                already_up_to_date: false
            }
        );
    }

    #[tokio::test]
    async fn file_source_skips_existing_content_and_joins_partial_lines() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("update.log");
        std::fs::write(&path, "Success! App '1' fully installed.\n").unwrap();

        let mut source = FileLineSource::open_at_end(&path).await.unwrap();
        assert_eq!(source.next_line().await.unwrap(), None);

        let mut f = std::fs::OpenOptions::new().append(true).open(&path).unwrap();
        write!(f, "Update state (0x61) downloading, progr").unwrap();
        f.flush().unwrap();
        assert_eq!(source.next_line().await.unwrap(), None);

        writeln!(f, "ess: 12.5 (1 / 8)\r").unwrap();
        f.flush().unwrap();
        assert_eq!(
            source.next_line().await.unwrap().as_deref(),
            Some("Update state (0x61) downloading, progress: 12.5 (1 / 8)")
        );
    }

    #[tokio::test]
    async fn marker_without_trailing_newline_is_read_after_exit() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("update.log");
        std::fs::write(&path, "").unwrap();
        let mut source = FileLineSource::open_at_end(&path).await.unwrap();

        let mut f = std::fs::OpenOptions::new().append(true).open(&path).unwrap();
        write!(f, "Success! App '380870' already up to date.").unwrap();
        f.flush().unwrap();

        let mut handle = ProcessHandle::new(Some(3), ScriptedChild::exited());
        let sink = RecordingSink::default();
        let end = tail(&mut source, &mut handle, Duration::from_millis(10), &sink)
            .await
            .unwrap();

        assert_eq!(
            end,
            TailEnd::Completed {
                already_up_to_date: true
            }
        );
        assert_eq!(
            phases(&sink).last(),
            Some(&(UpdatePhase::AlreadyUpToDate, None))
        );
        assert_eq!(source.take_unterminated(), None);
    }

    #[tokio::test]
    async fn tail_file_follows_appended_lines() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("update.log");
        std::fs::write(&path, "").unwrap();

        let (child, exit) = ScriptedChild::running();
        let mut handle = ProcessHandle::new(Some(3), child);
        let sink = RecordingSink::default();

        let writer_path = path.clone();
        let writer = tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            let mut f = std::fs::OpenOptions::new()
                .append(true)
                .open(&writer_path)
                .unwrap();
            writeln!(f, "Update state (0x11) preallocating, progress: 50.0 (1 / 2)").unwrap();
            f.flush().unwrap();
            tokio::time::sleep(Duration::from_millis(50)).await;
            exit.store(true, Ordering::SeqCst);
        });

        let end = tail_file(&path, &mut handle, Duration::from_millis(10), &sink)
            .await
            .unwrap();
        writer.await.unwrap();

        assert_eq!(end, TailEnd::ProcessExitedQuietly);
        assert!(phases(&sink).contains(&(UpdatePhase::Preallocating, Some(50.0))));
    }

    #[tokio::test]
    async fn missing_log_is_an_open_error() {
        let dir = tempfile::tempdir().unwrap();
        let (child, _exit) = ScriptedChild::running();
        let mut handle = ProcessHandle::new(None, child);
        let err = tail_file(
            &dir.path().join("nope.log"),
            &mut handle,
            DEFAULT_POLL_INTERVAL,
            &RecordingSink::default(),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, TailError::Open { .. }));
    }
}
