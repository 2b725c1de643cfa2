//! Belt-speed telemetry sampling.
//!
//! One sample run opens a single PLC session, reads the three monitored
//! registers five times at one-second intervals and renders the series
//! for the report. Telemetry is expected to vary over time, so the pacing
//! is part of the contract: rounds are never skipped, only the wait is
//! cancellable. Any read failure fails the whole run; the orchestrator
//! substitutes the unavailable sentinel.

pub mod s7;

pub use s7::{PlcError, S7Client};

use linecheck_common::PlcSettings;
use std::time::Duration;
use tokio::time;
use tracing::debug;

/// Reads per register in one sample run.
pub const SAMPLE_ROUNDS: usize = 5;

/// Pause between rounds.
pub const SAMPLE_INTERVAL: Duration = Duration::from_secs(1);

/// One register's readings, in sampling order. Raw engineering units; no
/// conversion happens at this layer.
#[derive(Debug, Clone, PartialEq)]
pub struct SampleSeries {
    values: Vec<f32>,
}

impl SampleSeries {
    pub fn new(values: Vec<f32>) -> Self {
        Self { values }
    }

    pub fn values(&self) -> &[f32] {
        &self.values
    }

    /// Bracketed comma-joined list with exactly two decimal digits, e.g.
    /// `[12.34,12.30,12.31,12.29,12.33]`. The rendering is byte-stable:
    /// downstream tooling parses it out of the report.
    pub fn render(&self) -> String {
        let joined = self
            .values
            .iter()
            .map(|v| format_reading(*v))
            .collect::<Vec<_>>()
            .join(",");
        format!("[{}]", joined)
    }
}

/// The three monitored register series of one sample run.
#[derive(Debug, Clone, PartialEq)]
pub struct SampleSet {
    pub speed_feedback: SampleSeries,
    pub frequency_feedback: SampleSeries,
    pub frequency_setpoint: SampleSeries,
}

impl SampleSet {
    /// Report body for the belt-speed section: three labelled,
    /// tab-indented lines.
    pub fn render(&self) -> String {
        format!(
            "\tspeed feedback: {}\n\tfrequency feedback: {}\n\tfrequency setpoint: {}",
            self.speed_feedback.render(),
            self.frequency_feedback.render(),
            self.frequency_setpoint.render()
        )
    }
}

/// Runs one full sample pass against the controller.
///
/// The session closes on every exit path: the client owns the socket and
/// drops it whether the pass completes, a read fails, or the caller
/// cancels during an inter-round wait.
pub async fn sample(plc: &PlcSettings) -> Result<SampleSet, PlcError> {
    let mut client = S7Client::connect(plc).await?;

    let mut speed = Vec::with_capacity(SAMPLE_ROUNDS);
    let mut frequency = Vec::with_capacity(SAMPLE_ROUNDS);
    let mut setpoint = Vec::with_capacity(SAMPLE_ROUNDS);

    for round in 0..SAMPLE_ROUNDS {
        speed.push(client.read_db_real(plc.db_number, plc.speed_feedback_offset).await?);
        frequency.push(
            client
                .read_db_real(plc.db_number, plc.frequency_feedback_offset)
                .await?,
        );
        setpoint.push(
            client
                .read_db_real(plc.db_number, plc.frequency_setpoint_offset)
                .await?,
        );
        debug!("sample round {}/{} complete", round + 1, SAMPLE_ROUNDS);
        if round + 1 < SAMPLE_ROUNDS {
            time::sleep(SAMPLE_INTERVAL).await;
        }
    }

    Ok(SampleSet {
        speed_feedback: SampleSeries::new(speed),
        frequency_feedback: SampleSeries::new(frequency),
        frequency_setpoint: SampleSeries::new(setpoint),
    })
}

/// Renders one reading with exactly two decimal digits.
///
/// Rounding is half-up on the value's shortest decimal representation, so
/// `12.345` renders as `12.35` even though the nearest f32 sits slightly
/// below it. This matches the numbers the line operators have always seen
/// in these reports.
fn format_reading(value: f32) -> String {
    if !value.is_finite() {
        return value.to_string();
    }
    round_half_up_2(&value.to_string())
}

fn round_half_up_2(repr: &str) -> String {
    let (sign, unsigned) = match repr.strip_prefix('-') {
        Some(rest) => ("-", rest),
        None => ("", repr),
    };
    let (int_part, frac_part) = match unsigned.split_once('.') {
        Some((int, frac)) => (int, frac),
        None => (unsigned, ""),
    };

    let mut int_digits: Vec<u8> = int_part.bytes().collect();
    let mut frac_digits: Vec<u8> = frac_part.bytes().collect();
    while frac_digits.len() < 2 {
        frac_digits.push(b'0');
    }
    let round_up = frac_digits.len() > 2 && frac_digits[2] >= b'5';
    frac_digits.truncate(2);

    if round_up && add_one(&mut frac_digits) && add_one(&mut int_digits) {
        int_digits.insert(0, b'1');
    }

    format!(
        "{}{}.{}",
        sign,
        String::from_utf8_lossy(&int_digits),
        String::from_utf8_lossy(&frac_digits)
    )
}

/// Adds one to a decimal digit string in place; true means the carry fell
/// off the front (all digits were 9).
fn add_one(digits: &mut [u8]) -> bool {
    for digit in digits.iter_mut().rev() {
        if *digit == b'9' {
            *digit = b'0';
        } else {
            *digit += 1;
            return false;
        }
    }
    true
}
