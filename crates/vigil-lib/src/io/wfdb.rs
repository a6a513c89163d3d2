use crate::signal::{RecordMeta, Recording};
use anyhow::{anyhow, Context, Result};
use log::debug;
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

pub const HEADER_EXTENSION: &str = "hea";

/// ADC units per physical unit when a signal line leaves the gain out.
pub const DEFAULT_GAIN: f64 = 200.0;

/// One signal specification line of a WFDB header.
#[derive(Debug, Clone, PartialEq)]
pub struct SignalSpec {
    pub file: String,
    /// Storage format, e.g. `16` or `212`.
    pub format: u32,
    /// Bytes to skip at the start of `file` before the first sample.
    pub byte_offset: usize,
    pub gain: f64,
    pub baseline: i32,
    pub name: String,
}

impl SignalSpec {
    pub fn to_physical(&self, sample: i16) -> f64 {
        (sample as f64 - self.baseline as f64) / self.gain
    }
}

/// Text fields of a WFDB `.hea` header.
#[derive(Debug, Clone, PartialEq)]
pub struct WfdbHeader {
    pub record: String,
    pub fs: f64,
    /// Samples per signal, when the record line states it.
    pub num_samples: Option<usize>,
    pub signals: Vec<SignalSpec>,
    pub comments: Vec<String>,
}

impl WfdbHeader {
    pub fn signal_names(&self) -> Vec<String> {
        self.signals.iter().map(|s| s.name.clone()).collect()
    }
}

/// Parse the record line, signal specification lines and `#` comments.
pub fn parse_header(text: &str) -> Result<WfdbHeader> {
    let mut comments = Vec::new();
    let mut lines = Vec::new();
    for line in text.lines() {
        let trimmed = line.trim();
        if let Some(comment) = trimmed.strip_prefix('#') {
            let comment = comment.trim();
            if !comment.is_empty() {
                comments.push(comment.to_string());
            }
        } else if !trimmed.is_empty() {
            lines.push(trimmed);
        }
    }

    let record_line = lines.first().ok_or_else(|| anyhow!("header has no record line"))?;
    let fields: Vec<&str> = record_line.split_whitespace().collect();
    let record = fields
        .first()
        .map(|&name| name.split('/').next().unwrap_or(name).to_string())
        .ok_or_else(|| anyhow!("record line is empty"))?;
    let nsig: usize = fields
        .get(1)
        .ok_or_else(|| anyhow!("record line lacks a signal count"))?
        .parse()
        .with_context(|| format!("signal count in record line: {}", record_line))?;
    // `250`, `250/1`, `250(0)` all mean 250 Hz; WFDB defaults to 250 when absent.
    let fs = match fields.get(2) {
        Some(&raw) => raw
            .split(['/', '('])
            .next()
            .unwrap_or(raw)
            .parse::<f64>()
            .with_context(|| format!("sampling frequency in record line: {}", record_line))?,
        None => 250.0,
    };
    let num_samples = match fields.get(3) {
        Some(raw) => Some(
            raw.parse::<usize>()
                .with_context(|| format!("sample count in record line: {}", record_line))?,
        ),
        None => None,
    };

    let signal_lines = &lines[1..];
    if signal_lines.len() < nsig {
        anyhow::bail!(
            "header declares {} signals but lists {}",
            nsig,
            signal_lines.len()
        );
    }
    let signals = signal_lines[..nsig]
        .iter()
        .enumerate()
        .map(|(idx, line)| {
            parse_signal_line(idx, line).with_context(|| format!("signal line: {}", line))
        })
        .collect::<Result<Vec<_>>>()?;

    Ok(WfdbHeader {
        record,
        fs,
        num_samples,
        signals,
        comments,
    })
}

/// `file format[xspf][:skew][+offset] [gain[(baseline)][/units]] [resolution] [adc_zero] ...`
fn parse_signal_line(idx: usize, line: &str) -> Result<SignalSpec> {
    let parts: Vec<&str> = line.split_whitespace().collect();
    let file = parts
        .first()
        .ok_or_else(|| anyhow!("signal line is empty"))?
        .to_string();

    let format_field = parts
        .get(1)
        .ok_or_else(|| anyhow!("signal line lacks a format"))?;
    let (format_part, byte_offset) = match format_field.split_once('+') {
        Some((format, offset)) => (
            format,
            offset.parse::<usize>().context("byte offset")?,
        ),
        None => (*format_field, 0),
    };
    let (format_part, frame) = match format_part.split_once('x') {
        Some((format, rest)) => (format, Some(rest)),
        None => match format_part.split_once(':') {
            Some((format, _skew)) => (format, None),
            None => (format_part, None),
        },
    };
    if let Some(frame) = frame {
        let per_frame: usize = frame
            .split(':')
            .next()
            .unwrap_or(frame)
            .parse()
            .context("samples per frame")?;
        if per_frame != 1 {
            anyhow::bail!("{} samples per frame is not supported", per_frame);
        }
    }
    let format: u32 = format_part.parse().context("storage format")?;

    let adc_zero: i32 = match parts.get(4) {
        Some(raw) => raw.parse().context("ADC zero")?,
        None => 0,
    };
    let (gain, baseline) = match parts.get(2) {
        Some(&raw) => {
            let value = raw.split('/').next().unwrap_or(raw);
            let (gain, baseline) = match value.split_once('(') {
                Some((gain, baseline)) => (
                    gain,
                    Some(
                        baseline
                            .trim_end_matches(')')
                            .parse::<i32>()
                            .context("baseline")?,
                    ),
                ),
                None => (value, None),
            };
            let gain: f64 = gain.parse().context("ADC gain")?;
            (gain, baseline.unwrap_or(adc_zero))
        }
        None => (DEFAULT_GAIN, adc_zero),
    };
    // A zero gain marks an uncalibrated signal.
    let gain = if gain == 0.0 { DEFAULT_GAIN } else { gain };

    let name = if parts.len() > 8 {
        parts[8..].join(" ")
    } else {
        format!("signal {}", idx)
    };

    Ok(SignalSpec {
        file,
        format,
        byte_offset,
        gain,
        baseline,
        name,
    })
}

/// Raw samples of one data file, still interleaved across its signals.
pub fn decode_samples(buf: &[u8], format: u32, byte_offset: usize) -> Result<Vec<i16>> {
    let body = buf.get(byte_offset..).ok_or_else(|| {
        anyhow!(
            "byte offset {} is past the end of a {}-byte file",
            byte_offset,
            buf.len()
        )
    })?;
    match format {
        16 => Ok(body
            .chunks_exact(2)
            .map(|pair| i16::from_le_bytes([pair[0], pair[1]]))
            .collect()),
        212 => Ok(wfdb_rust::signal::parse_212_format(body)),
        other => anyhow::bail!("WFDB storage format {} is not supported", other),
    }
}

/// Load every signal of a WFDB record, converted to physical units.
pub fn load_wfdb_record(header_path: &Path) -> Result<Recording> {
    let text = fs::read_to_string(header_path)
        .with_context(|| format!("failed to read {}", header_path.display()))?;
    let header = parse_header(&text).with_context(|| format!("parsing {}", header_path.display()))?;
    let data_dir = header_path.parent().unwrap_or_else(|| Path::new("."));

    // Signals sharing a data file are interleaved frame by frame, in header order.
    let mut files: Vec<(&str, Vec<usize>)> = Vec::new();
    for (idx, spec) in header.signals.iter().enumerate() {
        match files.iter().position(|(file, _)| *file == spec.file) {
            Some(pos) => files[pos].1.push(idx),
            None => files.push((spec.file.as_str(), vec![idx])),
        }
    }

    let mut columns = vec![Vec::new(); header.signals.len()];
    for (file, members) in &files {
        let first = &header.signals[members[0]];
        if members
            .iter()
            .any(|&idx| header.signals[idx].format != first.format)
        {
            anyhow::bail!("signals in {} use mixed storage formats", file);
        }
        let path = data_dir.join(file);
        let buf = fs::read(&path).with_context(|| format!("failed to read {}", path.display()))?;
        let samples = decode_samples(&buf, first.format, first.byte_offset)
            .with_context(|| format!("decoding {}", path.display()))?;

        let mut frames = samples.len() / members.len();
        if let Some(n) = header.num_samples.filter(|&n| n > 0) {
            frames = frames.min(n);
        }
        for (slot, &idx) in members.iter().enumerate() {
            let spec = &header.signals[idx];
            columns[idx] = samples
                .iter()
                .skip(slot)
                .step_by(members.len())
                .take(frames)
                .map(|&sample| spec.to_physical(sample))
                .collect();
        }
    }

    let meta = RecordMeta {
        name: header.record.clone(),
        fs: header.fs,
        channels: header.signal_names(),
        comments: header.comments,
    };
    Recording::new(meta, columns)
}

/// Load every record in `dir`, keyed by header file stem.
pub fn read_signals(dir: &Path) -> Result<BTreeMap<String, Recording>> {
    let entries =
        fs::read_dir(dir).with_context(|| format!("failed to list {}", dir.display()))?;
    let mut headers = Vec::new();
    for entry in entries {
        let path = entry?.path();
        if path.extension().and_then(|e| e.to_str()) == Some(HEADER_EXTENSION) {
            headers.push(path);
        }
    }
    headers.sort();

    let mut records = BTreeMap::new();
    for path in headers {
        let Some(id) = path.file_stem().and_then(|s| s.to_str()) else {
            continue;
        };
        let recording = load_wfdb_record(&path)?;
        debug!(
            "loaded {} ({} channels, {:.1}s)",
            id,
            recording.meta.channels.len(),
            recording.duration()
        );
        records.insert(id.to_string(), recording);
    }
    Ok(records)
}

/// First `num_training` records (by id) train, the rest test.
pub fn split_dataset(
    records: BTreeMap<String, Recording>,
    num_training: usize,
) -> (BTreeMap<String, Recording>, BTreeMap<String, Recording>) {
    let mut training = BTreeMap::new();
    let mut testing = BTreeMap::new();
    for (idx, (id, recording)) in records.into_iter().enumerate() {
        if idx < num_training {
            training.insert(id, recording);
        } else {
            testing.insert(id, recording);
        }
    }
    (training, testing)
}
