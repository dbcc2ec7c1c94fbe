use crate::pipeline::outcome::BuildStatus;
use crate::pipeline::pool::PoolEvent;
use crate::ui::icons::{CHECK, CROSS, SKIP, WARN, WORKER};
use console::style;
use indicatif::{MultiProgress, ProgressBar, ProgressDrawTarget, ProgressStyle};
use std::time::Duration;

/// Terminal progress for a pool run, driven by [`PoolEvent`]s.
///
/// One bar counts finished repositories; each finished repository also gets
/// a line above the bar. Rendering goes to stderr and is hidden when stderr
/// is not a terminal.
pub struct RunProgress {
    multi: MultiProgress,
    bar: ProgressBar,
    verbose: bool,
}

impl RunProgress {
    pub fn new(total: u64, verbose: bool) -> Self {
        let target = if console::Term::stderr().is_term() {
            ProgressDrawTarget::stderr()
        } else {
            ProgressDrawTarget::hidden()
        };
        let multi = MultiProgress::with_draw_target(target);

        let bar_style = ProgressStyle::default_bar()
            .template("{prefix:.bold.dim} {spinner} [{bar:40.cyan/blue}] {pos}/{len} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("█▓▒░");

        let bar = multi.add(ProgressBar::new(total));
        bar.set_style(bar_style);
        bar.set_prefix("Repos");
        bar.enable_steady_tick(Duration::from_millis(100));

        Self {
            multi,
            bar,
            verbose,
        }
    }

    fn print_line(&self, msg: impl AsRef<str>) {
        if self.multi.is_hidden() || self.multi.println(msg.as_ref()).is_err() {
            eprintln!("{}", msg.as_ref());
        }
    }

    pub fn handle_event(&self, event: &PoolEvent) {
        match event {
            PoolEvent::WorkerStarted { worker, assigned } => {
                if self.verbose {
                    self.print_line(format!(
                        "  {}{} {}",
                        WORKER,
                        style(format!("worker {}", worker)).dim(),
                        style(format!("started with {} repositories", assigned)).dim()
                    ));
                }
            }
            PoolEvent::RepositoryFinished { url, status, .. } => {
                self.bar.inc(1);
                self.bar.set_message(url.clone());
                let (icon, label) = match status {
                    BuildStatus::Compiled => (&CHECK, style(status.to_string()).green()),
                    BuildStatus::CompilationError => (&CROSS, style(status.to_string()).red()),
                    BuildStatus::NotBuilt => (&SKIP, style(status.to_string()).yellow()),
                };
                self.print_line(format!("  {}{} {}", icon, url, label));
            }
            PoolEvent::WorkerExited { worker, clean } => {
                if !clean {
                    self.print_line(format!(
                        "  {}{}",
                        WARN,
                        style(format!(
                            "worker {} exited before finishing its repositories",
                            worker
                        ))
                        .yellow()
                    ));
                }
            }
        }
    }

    pub fn finish(&self) {
        self.bar.finish_and_clear();
    }
}
