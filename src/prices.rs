//! Price series input.

use std::{fs::File, io::Read, path::Path};

use chrono::{DateTime, NaiveDateTime, TimeDelta, Timelike};
use itertools::Itertools;

use crate::{
    core::series::{Point, PriceSeries, Timestamp},
    format::Format,
    prelude::*,
    quantity::rate::KilowattHourRate,
};

/// Local-time formats seen in the SMARD exports, interpreted as UTC.
const NAIVE_TIME_FORMATS: [&str; 4] =
    ["%b %d, %Y %I:%M %p", "%d.%m.%Y %H:%M", "%Y-%m-%d %H:%M:%S", "%Y-%m-%d %H:%M"];

/// Load the series from either a JSON or a SMARD CSV file, depending on the extension.
#[instrument(skip_all, fields(path = %path.display()))]
pub fn load(path: &Path) -> Result<PriceSeries> {
    let file =
        File::open(path).with_context(|| format!("failed to open `{}`", path.display()))?;
    let series = match Format::of(path) {
        Format::Json => read_json(file)?,
        Format::Csv => read_smard(file)?,
    };
    info!(len = series.len(), since = %series[0].time, "loaded the prices");
    Ok(series)
}

/// Read a JSON array of `{"time": "<RFC 3339>", "price": <€/kWh>}` records.
pub fn read_json(reader: impl Read) -> Result<PriceSeries> {
    let points: Vec<Point> =
        serde_json::from_reader(std::io::BufReader::new(reader)).context("malformed prices")?;
    Ok(PriceSeries::try_new(points)?)
}

/// Read a [SMARD][1] day-ahead price export.
///
/// The file is semicolon-separated, with the `Start date` column and a `[€/MWh]` price column.
/// Missing prices and missing hours are linearly interpolated, repeated hours are dropped.
///
/// [1]: https://www.smard.de/en/downloadcenter/download-market-data
pub fn read_smard(reader: impl Read) -> Result<PriceSeries> {
    let mut reader = csv::ReaderBuilder::new().delimiter(b';').flexible(true).from_reader(reader);
    let headers = reader.headers().context("malformed CSV header")?.clone();
    let time_index = headers
        .iter()
        .position(|header| header.trim_start_matches('\u{feff}').trim() == "Start date")
        .context("no `Start date` column")?;
    let price_index = headers
        .iter()
        .position(|header| header.contains("/MWh]"))
        .context("no `[€/MWh]` price column")?;

    let mut samples = Vec::new();
    for (index, record) in reader.records().enumerate() {
        let record = record.with_context(|| format!("malformed CSV record #{}", index + 1))?;
        let time = record.get(time_index).context("missing start date")?;
        let time = parse_time(time).with_context(|| format!("invalid start date `{time}`"))?;
        let price = record.get(price_index).unwrap_or_default();
        let price = parse_megawatt_hour_price(price)
            .with_context(|| format!("invalid price `{price}` at {time}"))?;
        samples.push((time, price));
    }
    fill_hours(samples)
}

fn parse_time(text: &str) -> Result<Timestamp> {
    let text = text.trim();
    if let Ok(time) = DateTime::parse_from_rfc3339(text) {
        return Ok(time);
    }
    NAIVE_TIME_FORMATS
        .iter()
        .find_map(|format| NaiveDateTime::parse_from_str(text, format).ok())
        .map(|time| time.and_utc().fixed_offset())
        .context("unknown date format")
}

/// Parse the €/MWh price into €/kWh, `-` and empty mean missing.
fn parse_megawatt_hour_price(text: &str) -> Result<Option<KilowattHourRate>> {
    let text = text.trim();
    if text.is_empty() || text == "-" {
        return Ok(None);
    }
    // Whichever separator comes last is the decimal one:
    let normalized = match (text.rfind(','), text.rfind('.')) {
        (Some(comma), Some(dot)) if comma > dot => text.replace('.', "").replace(',', "."),
        (Some(_), None) => text.replace(',', "."),
        _ => text.replace(',', ""),
    };
    Ok(Some(KilowattHourRate::from(normalized.parse::<f64>()? / 1000.0)))
}

/// Put the samples onto a contiguous hourly grid and interpolate the holes.
fn fill_hours(mut samples: Vec<(Timestamp, Option<KilowattHourRate>)>) -> Result<PriceSeries> {
    samples.sort_by_key(|(time, _)| *time);
    let n_samples = samples.len();
    samples.dedup_by_key(|(time, _)| *time);
    if samples.len() != n_samples {
        warn!(n_dropped = n_samples - samples.len(), "dropped repeated hours");
    }

    let (Some((first_time, _)), Some((last_time, _))) = (samples.first(), samples.last()) else {
        bail!("the price file has no records");
    };
    let (first_time, last_time) = (*first_time, *last_time);
    if let Some((time, _)) =
        samples.iter().find(|(time, _)| time.minute() != 0 || time.second() != 0)
    {
        bail!("only hourly prices are supported, got a sample at {time}");
    }

    let n_hours = usize::try_from((last_time - first_time).num_hours())? + 1;
    let mut prices: Vec<Option<KilowattHourRate>> = vec![None; n_hours];
    for (time, price) in samples {
        prices[usize::try_from((time - first_time).num_hours())?] = price;
    }
    ensure!(prices[0].is_some(), "no price at {first_time}, nothing to interpolate from");

    let known = prices.iter().positions(Option::is_some).collect_vec();
    let mut n_filled = 0;
    for (left, right) in known.iter().copied().tuple_windows() {
        let (Some(from), Some(to)) = (prices[left], prices[right]) else { continue };
        #[expect(clippy::cast_precision_loss)]
        let span = (right - left) as f64;
        for (offset, price) in prices[(left + 1)..right].iter_mut().enumerate() {
            #[expect(clippy::cast_precision_loss)]
            let weight = (offset + 1) as f64 / span;
            *price = Some(from + (to - from) * weight);
            n_filled += 1;
        }
    }
    if let Some(&last_known) = known.last() {
        let last_price = prices[last_known];
        for price in &mut prices[(last_known + 1)..] {
            *price = last_price;
            n_filled += 1;
        }
    }
    if n_filled != 0 {
        warn!(n_filled, "interpolated missing prices");
    }

    let points = prices
        .into_iter()
        .enumerate()
        .map(|(index, price)| {
            let offset = TimeDelta::hours(i64::try_from(index)?);
            Ok(Point::new(first_time + offset, price.unwrap_or_default()))
        })
        .collect::<Result<Vec<_>>>()?;
    Ok(PriceSeries::try_new(points)?)
}
