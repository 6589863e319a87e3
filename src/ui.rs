//! Terminal presentation for the `brainsight` CLI: progress on stderr, results
//! on stdout.

use indicatif::{ProgressBar, ProgressDrawTarget, ProgressStyle};
use std::time::{Duration, Instant};

use brainsight::{DetectionResult, Notice, Severity};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum UiMode {
    Auto,
    Plain,
    Pretty,
}

impl UiMode {
    fn from_flag(flag: Option<&str>) -> Self {
        match flag.map(str::trim) {
            Some("plain") => UiMode::Plain,
            Some("pretty") => UiMode::Pretty,
            _ => UiMode::Auto,
        }
    }
}

#[derive(Clone, Debug)]
pub struct Ui {
    spinners: bool,
}

impl Ui {
    /// `piped` is true when stdout is redirected; auto mode then stays plain.
    pub fn from_args(ui_flag: Option<&str>, stderr_is_tty: bool, piped: bool) -> Self {
        let spinners = stderr_is_tty
            && match UiMode::from_flag(ui_flag) {
                UiMode::Pretty => true,
                UiMode::Auto => !piped,
                UiMode::Plain => false,
            };
        Self { spinners }
    }

    /// Announce a pipeline step; the returned guard reports its duration when
    /// dropped.
    pub fn stage(&self, step: &str) -> Stage {
        let spinner = self.spinners.then(|| {
            let spinner = ProgressBar::with_draw_target(None, ProgressDrawTarget::stderr());
            let style = ProgressStyle::with_template("{spinner:.cyan} {msg} [{elapsed}]")
                .unwrap_or_else(|_| ProgressStyle::default_spinner());
            spinner.set_style(style);
            spinner.set_message(step.to_string());
            spinner.enable_steady_tick(Duration::from_millis(100));
            spinner
        });
        if spinner.is_none() {
            eprintln!("brainsight: {step}");
        }
        Stage {
            step: step.to_string(),
            started: Instant::now(),
            spinner,
        }
    }

    /// Toast equivalent: one line on stderr.
    pub fn notify(&self, notice: &Notice) {
        let marker = match notice.severity {
            Severity::Info => "✔",
            Severity::Warning => "!",
            Severity::Destructive => "✖",
        };
        eprintln!("{} {}: {}", marker, notice.title, notice.description);
    }

    /// Object badges with percent confidence, then the explanation.
    pub fn render_result(&self, result: &DetectionResult) {
        println!("Detected Objects");
        if result.objects().is_empty() {
            println!("  (none)");
        }
        for object in result.objects() {
            println!("  [{} {}%]", object.name(), object.percent());
        }
        println!();
        println!("Perception Process");
        println!("  {}", result.explanation());
    }
}

pub struct Stage {
    step: String,
    started: Instant,
    spinner: Option<ProgressBar>,
}

impl Drop for Stage {
    fn drop(&mut self) {
        let took = elapsed_label(self.started.elapsed());
        match self.spinner.take() {
            Some(spinner) => spinner.finish_with_message(format!("{} ({took})", self.step)),
            None => eprintln!("brainsight: {} done ({took})", self.step),
        }
    }
}

fn elapsed_label(elapsed: Duration) -> String {
    match elapsed.as_millis() {
        ms if ms < 1000 => format!("{ms}ms"),
        _ => format!("{:.1}s", elapsed.as_secs_f64()),
    }
}
