use indicatif::{ProgressBar, ProgressStyle};
use tokio::sync::broadcast::error::{RecvError, TryRecvError};
use tokio::sync::broadcast::Receiver;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;

use unimage::{NoticeLevel, StudioEvent};

/// Renders studio events on the terminal while a command runs.
pub struct ProgressRenderer {
    task: JoinHandle<usize>,
    stop: oneshot::Sender<()>,
    pb: ProgressBar,
}

impl ProgressRenderer {
    /// Starts rendering. Without `bar` only notices are printed.
    pub fn spawn(mut events: Receiver<StudioEvent>, bar: bool) -> Self {
        let pb = if bar {
            ProgressBar::new(100)
        } else {
            ProgressBar::hidden()
        };
        pb.set_style(
            ProgressStyle::with_template(
                "{spinner:.green} {prefix:>12} [{bar:40.cyan/blue}] {pos:>3}% {wide_msg}",
            )
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("#>-"),
        );
        pb.set_prefix("Analyzing");

        let bar = pb.clone();
        let (stop, mut stopped) = oneshot::channel();
        let task = tokio::spawn(async move {
            let mut rendered = 0;
            loop {
                tokio::select! {
                    biased;
                    received = events.recv() => match received {
                        Ok(event) => {
                            render(&bar, event);
                            rendered += 1;
                        }
                        Err(RecvError::Lagged(skipped)) => {
                            log::debug!("Progress renderer skipped {} events", skipped);
                        }
                        Err(RecvError::Closed) => return rendered,
                    },
                    _ = &mut stopped => break,
                }
            }
            rendered + drain_pending(&mut events, &bar)
        });

        Self { task, stop, pb }
    }

    /// Stops rendering once every event already sent has been shown.
    /// Returns how many events were rendered.
    pub async fn finish(self) -> usize {
        let _ = self.stop.send(());
        let rendered = match self.task.await {
            Ok(rendered) => rendered,
            Err(e) => {
                log::debug!("Progress renderer stopped abnormally: {}", e);
                0
            }
        };
        self.pb.finish_and_clear();
        rendered
    }
}

fn drain_pending(events: &mut Receiver<StudioEvent>, pb: &ProgressBar) -> usize {
    let mut rendered = 0;
    loop {
        match events.try_recv() {
            Ok(event) => {
                render(pb, event);
                rendered += 1;
            }
            Err(TryRecvError::Lagged(_)) => continue,
            Err(_) => return rendered,
        }
    }
}

fn render(pb: &ProgressBar, event: StudioEvent) {
    match event {
        StudioEvent::Progress {
            progress: Some(progress),
        } => {
            pb.set_position(u64::from(progress.total_progress));
            if let Some(step) = progress.current_step() {
                pb.set_message(format!("{} ({})", step.name, step.status));
            }
            if let Some(eta) = progress.estimated_time_remaining_ms.filter(|ms| *ms > 0) {
                pb.set_prefix(format!("~{}s left", eta.div_ceil(1000)));
            }
        }
        StudioEvent::Progress { progress: None } => {
            pb.set_position(0);
            pb.set_message("");
        }
        StudioEvent::Notice { level, message } => {
            let tag = match level {
                NoticeLevel::Info => "info",
                NoticeLevel::Success => "ok",
                NoticeLevel::Error => "error",
            };
            print_line(pb, format!("[{}] {}", tag, message));
        }
        StudioEvent::CredentialRequired { message } => {
            print_line(pb, format!("[error] {}", message));
        }
        StudioEvent::View { .. } => {}
    }
}

/// A hidden bar swallows `println`, so fall back to stderr.
fn print_line(pb: &ProgressBar, line: String) {
    if pb.is_hidden() {
        eprintln!("{}", line);
    } else {
        pb.println(line);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use unimage::StudioEventBroadcaster;

    #[tokio::test]
    async fn test_finish_renders_notices_sent_just_before() {
        let events = StudioEventBroadcaster::default();
        let renderer = ProgressRenderer::spawn(events.subscribe(), false);
        events.notify(NoticeLevel::Error, "Pipeline error");
        events.notify(NoticeLevel::Success, "Prompt generation complete");
        assert_eq!(renderer.finish().await, 2);
    }

    #[tokio::test]
    async fn test_finish_with_no_events() {
        let events = StudioEventBroadcaster::default();
        let renderer = ProgressRenderer::spawn(events.subscribe(), false);
        assert_eq!(renderer.finish().await, 0);
    }
}
