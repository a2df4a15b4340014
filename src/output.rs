//! Terminal rendering of pipeline events for `synchronia listen`.

use crate::emotion::{EmotionDistribution, EmotionLabel};
use crate::pipeline::PipelineObserver;
use owo_colors::OwoColorize;
use std::io::{self, Write};

/// Width of the probability bar for the top label.
const BAR_WIDTH: usize = 20;

/// One-line summary of a distribution: `joy 0.71 | neutral 0.20 | ...`,
/// highest probability first.
pub fn format_distribution(distribution: &EmotionDistribution) -> String {
    let mut entries: Vec<(EmotionLabel, f32)> = distribution.iter().collect();
    entries.sort_by(|a, b| b.1.total_cmp(&a.1));
    entries
        .iter()
        .map(|(label, p)| format!("{} {:.2}", label.as_str(), p))
        .collect::<Vec<_>>()
        .join(" | ")
}

/// Bar of `#` proportional to `probability` (clamped to 0..=1).
pub fn format_bar(probability: f32) -> String {
    let filled = (probability.clamp(0.0, 1.0) * BAR_WIDTH as f32).round() as usize;
    format!("{}{}", "#".repeat(filled), ".".repeat(BAR_WIDTH - filled))
}

fn colored_label(label: &str, color: bool) -> String {
    let tag = format!("[{}]", label.to_uppercase());
    if !color {
        return tag;
    }
    match label.parse::<EmotionLabel>().ok() {
        Some(EmotionLabel::Anger) => tag.red().bold().to_string(),
        Some(EmotionLabel::Joy) => tag.green().bold().to_string(),
        Some(EmotionLabel::Sadness) => tag.blue().bold().to_string(),
        _ => tag.dimmed().to_string(),
    }
}

/// Prints speech and advice as they arrive; emotion batches only when
/// `show_emotions` is set.
pub struct TerminalObserver<W: Write + Send> {
    out: W,
    color: bool,
    show_emotions: bool,
}

impl TerminalObserver<io::Stdout> {
    pub fn stdout(color: bool, show_emotions: bool) -> Self {
        Self::new(io::stdout(), color, show_emotions)
    }
}

impl<W: Write + Send> TerminalObserver<W> {
    pub fn new(out: W, color: bool, show_emotions: bool) -> Self {
        Self {
            out,
            color,
            show_emotions,
        }
    }

    pub fn into_inner(self) -> W {
        self.out
    }

    fn emit(&mut self, line: &str) {
        if let Err(e) = writeln!(self.out, "{line}").and_then(|()| self.out.flush()) {
            tracing::debug!(error = %e, "terminal write failed");
        }
    }
}

impl<W: Write + Send> PipelineObserver for TerminalObserver<W> {
    fn on_emotion(&mut self, distribution: &EmotionDistribution, batch_index: u64) {
        if !self.show_emotions {
            return;
        }
        let top = distribution.top();
        let bar = format_bar(distribution.get(top));
        let summary = format_distribution(distribution);
        let line = if self.color {
            format!(
                "{} {} {}",
                format!("#{batch_index:<4}").dimmed(),
                bar.cyan(),
                summary.dimmed()
            )
        } else {
            format!("#{batch_index:<4} {bar} {summary}")
        };
        self.emit(&line);
    }

    fn on_speech(&mut self, text: &str, emotion_label: &str) {
        let line = format!("{} {}", colored_label(emotion_label, self.color), text);
        self.emit(&line);
    }

    fn on_advice(&mut self, text: &str) {
        let header = if self.color {
            "--- advice ---".yellow().bold().to_string()
        } else {
            "--- advice ---".to_string()
        };
        self.emit(&header);
        for line in text.lines() {
            self.emit(&format!("  {line}"));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rendered(observer: TerminalObserver<Vec<u8>>) -> String {
        String::from_utf8(observer.into_inner()).unwrap()
    }

    #[test]
    fn test_format_distribution_orders_by_probability() {
        let dist = EmotionDistribution::from_probabilities(&[0.1, 0.2, 0.6, 0.1]).unwrap();
        let line = format_distribution(&dist);
        assert!(line.starts_with("joy 0.60"), "got: {line}");
        assert!(line.contains("anger 0.20"));
    }

    #[test]
    fn test_format_bar_bounds() {
        assert_eq!(format_bar(0.0), ".".repeat(BAR_WIDTH));
        assert_eq!(format_bar(1.0), "#".repeat(BAR_WIDTH));
        assert_eq!(format_bar(2.0), "#".repeat(BAR_WIDTH));
        assert_eq!(format_bar(0.5).matches('#').count(), BAR_WIDTH / 2);
    }

    #[test]
    fn test_speech_line_without_color() {
        let mut obs = TerminalObserver::new(Vec::new(), false, false);
        obs.on_speech("hello there", "joy");
        assert_eq!(rendered(obs), "[JOY] hello there\n");
    }

    #[test]
    fn test_emotions_hidden_unless_enabled() {
        let dist = EmotionDistribution::from_probabilities(&[1.0, 0.0, 0.0, 0.0]).unwrap();
        let mut quiet = TerminalObserver::new(Vec::new(), false, false);
        quiet.on_emotion(&dist, 0);
        assert!(rendered(quiet).is_empty());

        let mut shown = TerminalObserver::new(Vec::new(), false, true);
        shown.on_emotion(&dist, 7);
        let out = rendered(shown);
        assert!(out.starts_with("#7"));
        assert!(out.contains("neutral 1.00"));
    }

    #[test]
    fn test_advice_is_indented() {
        let mut obs = TerminalObserver::new(Vec::new(), false, false);
        obs.on_advice("1. Listen\n2. Ask");
        assert_eq!(rendered(obs), "--- advice ---\n  1. Listen\n  2. Ask\n");
    }
}
