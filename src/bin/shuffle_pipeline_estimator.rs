use mathilde_shuffle_transport::batch::{ColumnVector, VectorBatch, VectorValues};
use mathilde_shuffle_transport::codec::exports::{merge_local_partition, split_into_local_buffer};
use mathilde_shuffle_transport::compression::Compression;
use mathilde_shuffle_transport::config::{LocalBufferOptions, SplitterOptions};
use mathilde_shuffle_transport::schema::LogicalType;
use mathilde_shuffle_transport::{Error, Result};
use std::time::Instant;

#[cfg(feature = "tools-json")]
use serde::{Deserialize, Serialize};

/// pair (varchar), tf (char), e_ms (long), open/high/low/close/volume (double)
const BAR_TYPE_IDS: [i32; 8] = [15, 16, 2, 3, 3, 3, 3, 3];

#[cfg(feature = "tools-json")]
#[derive(Debug, Clone, Deserialize)]
struct EstimatorConfig {
    splitter: SplitterOptions,
    #[serde(default)]
    buffer: LocalBufferOptions,
}

#[cfg(feature = "tools-json")]
#[derive(Debug, Clone, Serialize)]
struct EstimatorReport {
    rows: usize,
    partitions: u32,
    compression: Compression,
    block_bytes: u64,
    physical_bytes: u64,
    blocks_written: u64,
    region_rollovers: u64,
    buffer_replacements: u64,
    split_s: f64,
    merge_s: f64,
    merged_batches: usize,
}

fn parse_arg(args: &[String], name: &str) -> Option<String> {
    for (i, a) in args.iter().enumerate() {
        if let Some(v) = a.strip_prefix(&(name.to_string() + "=")) {
            return Some(v.to_string());
        }
        if a == name {
            return args.get(i + 1).cloned();
        }
    }
    None
}

fn usage() -> &'static str {
    "\
shuffle_pipeline_estimator\n\
\n\
Splits a synthetic bar batch over N partitions, merges every partition back\n\
and prints block sizes and timings.\n\
\n\
Args:\n\
  --rows N              (default: 100000)\n\
  --partitions N        (default: 8)\n\
  --region-size N       (default: 65536)\n\
  --region-count N      (default: 64)\n\
  --compression NAME    none | zstd | gzip (default: none)\n\
  --max-rows N          merged batch row ceiling (default: 4096)\n\
  --max-bytes N         merged batch byte ceiling (default: 4194304)\n\
\n\
Notes:\n\
  - Timings come from a single run; these are not stable benchmarks.\n\
  - If built with `--features tools-json`, `--config FILE` reads splitter and\n\
    buffer options from JSON and `--json` prints the report as JSON. A config\n\
    with other type ids gets synthetic filler columns instead of bars.\n\
"
}

fn parse_compression(name: &str) -> Result<Compression> {
    match name {
        "none" => Ok(Compression::None),
        "zstd" => Ok(Compression::Zstd { level: 3 }),
        "gzip" => Ok(Compression::Gzip { level: 6 }),
        other => Err(Error::Compression(format!("unknown compression {other}"))),
    }
}

fn make_bars_like_columns(rows: usize) -> Result<Vec<ColumnVector>> {
    let pairs: Vec<&[u8]> = (0..rows)
        .map(|i| if (i & 1) == 0 { &b"BTCUSDT"[..] } else { &b"ETHUSDT"[..] })
        .collect();
    let e_ms: Vec<i64> = (0..rows)
        .map(|i| 1_700_000_000_000i64 + i as i64 * 60_000)
        .collect();

    let mut open = Vec::with_capacity(rows);
    let mut high = Vec::with_capacity(rows);
    let mut low = Vec::with_capacity(rows);
    let mut close = Vec::with_capacity(rows);
    let mut volume = Vec::with_capacity(rows);
    for i in 0..rows {
        let base = 10_000.0 + i as f64 * 0.25;
        open.push(base + 0.10);
        high.push(base + 0.20);
        low.push(base + 0.05);
        close.push(base + 0.15);
        volume.push(100.0 + (i % 10) as f64);
    }

    Ok(vec![
        ColumnVector::plain(VectorValues::from_bytes(&pairs)?),
        ColumnVector::dictionary(vec![0; rows], VectorValues::from_bytes(&["1m"])?),
        ColumnVector::plain(VectorValues::from_i64s(&e_ms)),
        ColumnVector::plain(VectorValues::from_f64s(&open)),
        ColumnVector::plain(VectorValues::from_f64s(&high)),
        ColumnVector::plain(VectorValues::from_f64s(&low)),
        ColumnVector::plain(VectorValues::from_f64s(&close)),
        ColumnVector::plain(VectorValues::from_f64s(&volume)),
    ])
}

/// Filler column for a schema read from `--config`.
fn make_synthetic_column(rows: usize, type_id: i32) -> Result<ColumnVector> {
    let values = match LogicalType::from_type_id(type_id)? {
        LogicalType::Boolean => {
            let v: Vec<bool> = (0..rows).map(|i| i % 3 == 0).collect();
            VectorValues::from_bools(&v)
        }
        LogicalType::Short => {
            let v: Vec<i16> = (0..rows).map(|i| (i % 1000) as i16).collect();
            VectorValues::from_i16s(&v)
        }
        LogicalType::Int | LogicalType::Date32 => {
            let v: Vec<i32> = (0..rows).map(|i| 19_000 + (i % 10_000) as i32).collect();
            VectorValues::from_i32s(&v)
        }
        LogicalType::Long | LogicalType::Date64 | LogicalType::Decimal64 => {
            let v: Vec<i64> = (0..rows)
                .map(|i| 1_700_000_000_000i64 + i as i64 * 60_000)
                .collect();
            VectorValues::from_i64s(&v)
        }
        LogicalType::Double => {
            let v: Vec<f64> = (0..rows).map(|i| 10_000.0 + i as f64 * 0.25).collect();
            VectorValues::from_f64s(&v)
        }
        LogicalType::Decimal128 => {
            let v: Vec<i128> = (0..rows).map(|i| i as i128 * 10i128.pow(18)).collect();
            VectorValues::from_i128s(&v)
        }
        LogicalType::Varchar | LogicalType::Char => {
            let v: Vec<String> = (0..rows).map(|i| format!("s{}", i % 97)).collect();
            VectorValues::from_bytes(&v)?
        }
    };
    Ok(ColumnVector::plain(values))
}

/// Bar columns for the default schema, filler columns for any other, with a
/// leading partition-id column unless the method is "single".
fn make_batch(rows: usize, splitter: &SplitterOptions) -> Result<VectorBatch> {
    let columns = if splitter.type_ids == BAR_TYPE_IDS {
        make_bars_like_columns(rows)?
    } else {
        splitter
            .type_ids
            .iter()
            .map(|&id| make_synthetic_column(rows, id))
            .collect::<Result<Vec<_>>>()?
    };
    if splitter.partition_method.is_single_partition() {
        return VectorBatch::new(columns);
    }

    let partitions = splitter.partition_num as u64;
    let pids: Vec<i32> = (0..rows)
        .map(|i| ((i as u64).wrapping_mul(0x9e37_79b9) % partitions) as i32)
        .collect();
    let mut vectors = Vec::with_capacity(columns.len() + 1);
    vectors.push(ColumnVector::plain(VectorValues::from_i32s(&pids)));
    vectors.extend(columns);
    VectorBatch::new(vectors)
}

fn numeric_arg<T: std::str::FromStr>(args: &[String], name: &str, default: T) -> T {
    parse_arg(args, name)
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

#[cfg(feature = "tools-json")]
fn load_config(path: &str) -> Result<(SplitterOptions, LocalBufferOptions)> {
    let text = std::fs::read_to_string(path)
        .map_err(|e| Error::Other(format!("read {path}: {e}")))?;
    let config: EstimatorConfig =
        serde_json::from_str(&text).map_err(|e| Error::Other(format!("parse {path}: {e}")))?;
    config.splitter.validate()?;
    config.buffer.validate()?;
    Ok((config.splitter, config.buffer))
}

fn options_from_args(args: &[String]) -> Result<(SplitterOptions, LocalBufferOptions)> {
    #[cfg(feature = "tools-json")]
    {
        if let Some(path) = parse_arg(args, "--config") {
            return load_config(&path);
        }
    }

    let partitions: u32 = numeric_arg(args, "--partitions", 8);
    let splitter = SplitterOptions::new("hash", partitions, BAR_TYPE_IDS.to_vec())?;
    let buffer = LocalBufferOptions {
        region_size: numeric_arg(args, "--region-size", 64 * 1024),
        region_count: numeric_arg(args, "--region-count", 64),
        compression: parse_compression(
            parse_arg(args, "--compression").as_deref().unwrap_or("none"),
        )?,
    };
    buffer.validate()?;
    Ok((splitter, buffer))
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args: Vec<String> = std::env::args().collect();
    if args.iter().any(|a| a == "--help" || a == "-h") {
        eprint!("{}", usage());
        std::process::exit(0);
    }

    let rows: usize = numeric_arg(&args, "--rows", 100_000);
    let max_rows: u32 = numeric_arg(&args, "--max-rows", 4096);
    let max_bytes: u32 = numeric_arg(&args, "--max-bytes", 4 * 1024 * 1024);
    let (splitter, buffer) = options_from_args(&args)?;
    let batch = make_batch(rows, &splitter)?;

    let t0 = Instant::now();
    let packer = split_into_local_buffer(&splitter, &buffer, [batch])?;
    let split_s = t0.elapsed().as_secs_f64();

    let t1 = Instant::now();
    let mut merged_rows = 0usize;
    let mut merged_batches = 0usize;
    for partition in 0..splitter.partition_num {
        let batches = merge_local_partition(
            packer.buffer(),
            partition,
            &splitter.type_ids,
            max_rows,
            max_bytes,
        )?;
        merged_batches += batches.len();
        merged_rows += batches.iter().map(|b| b.row_count).sum::<usize>();
    }
    let merge_s = t1.elapsed().as_secs_f64();
    if merged_rows != rows {
        return Err(Error::Other(format!(
            "merged {merged_rows} rows back, split {rows}"
        )));
    }

    let block_bytes: u64 = packer.partition_lengths().iter().sum();
    let physical_bytes: u64 = (0..splitter.partition_num)
        .map(|p| packer.buffer().partition_bytes(p).map(|b| b.len() as u64))
        .sum::<Result<u64>>()?;
    let metrics = packer.metrics();

    #[cfg(feature = "tools-json")]
    {
        if args.iter().any(|a| a == "--json") {
            let report = EstimatorReport {
                rows,
                partitions: splitter.partition_num,
                compression: buffer.compression,
                block_bytes,
                physical_bytes,
                blocks_written: metrics.blocks_written,
                region_rollovers: metrics.region_rollovers,
                buffer_replacements: metrics.buffer_replacements,
                split_s,
                merge_s,
                merged_batches,
            };
            let json = serde_json::to_string_pretty(&report)
                .map_err(|e| Error::Other(format!("report: {e}")))?;
            println!("{json}");
            return Ok(());
        }
    }

    println!("rows={rows} partitions={}", splitter.partition_num);
    println!(
        "buffer: region_size={} region_count={} compression={:?}",
        buffer.region_size, buffer.region_count, buffer.compression
    );
    println!(
        "split: block_bytes={block_bytes} physical_bytes={physical_bytes} ratio={:.3} blocks={} rollovers={} buffer_replacements={} split_s={split_s:.6}",
        physical_bytes as f64 / block_bytes.max(1) as f64,
        metrics.blocks_written,
        metrics.region_rollovers,
        metrics.buffer_replacements,
    );
    println!("merge: batches={merged_batches} rows={merged_rows} merge_s={merge_s:.6}");
    Ok(())
}
