use std::io::Write;

use anyhow::{anyhow, Context, Result};
use serde::Serialize;

use nep_abi::{Mode, NcType, Ncid, NC_GLOBAL};
use nep_core::{Engine, OpenRequest};
use nep_plugins::LoadReport;

/// Parse "UDF3|WRITE" or "netcdf4,classic_model" into mode flags.
pub fn parse_mode(text: Option<&str>) -> Result<Mode> {
    let Some(text) = text else {
        return Ok(Mode::empty());
    };
    text.split(['|', ','])
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .try_fold(Mode::empty(), |acc, name| {
            Mode::from_name(&name.to_ascii_uppercase())
                .map(|flag| acc | flag)
                .ok_or_else(|| anyhow!("unknown mode flag {name:?}"))
        })
}

fn type_name(t: NcType) -> String {
    match t {
        NcType::BYTE => "byte".into(),
        NcType::CHAR => "char".into(),
        NcType::SHORT => "short".into(),
        NcType::INT => "int".into(),
        NcType::FLOAT => "float".into(),
        NcType::DOUBLE => "double".into(),
        NcType::UBYTE => "ubyte".into(),
        NcType::USHORT => "ushort".into(),
        NcType::UINT => "uint".into(),
        NcType::INT64 => "int64".into(),
        NcType::UINT64 => "uint64".into(),
        NcType::STRING => "string".into(),
        other => format!("type#{}", other.0),
    }
}

fn show_magic(magic: Option<&[u8]>) -> Option<String> {
    magic.map(|m| m.escape_ascii().to_string())
}

#[derive(Debug, Serialize)]
struct DetectRow<'a> {
    path: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    slot: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    routing_value: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    rule: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

pub fn detect(
    engine: &Engine,
    paths: &[String],
    mode: Mode,
    json: bool,
    out: &mut impl Write,
) -> Result<()> {
    let rows: Vec<DetectRow<'_>> = paths
        .iter()
        .map(|path| match engine.detect(&OpenRequest::new(path, mode)) {
            Ok(d) => DetectRow {
                path,
                slot: Some(d.slot.to_string()),
                routing_value: Some(d.slot.routing_value()),
                rule: Some(d.rule.to_string()),
                error: None,
            },
            Err(e) => DetectRow {
                path,
                slot: None,
                routing_value: None,
                rule: None,
                error: Some(e.to_string()),
            },
        })
        .collect();

    if json {
        serde_json::to_writer_pretty(&mut *out, &rows)?;
        writeln!(out)?;
        return Ok(());
    }
    for row in &rows {
        match (&row.slot, &row.rule, &row.error) {
            (Some(slot), Some(rule), _) => writeln!(out, "{}: {slot} (by {rule})", row.path)?,
            (_, _, Some(err)) => writeln!(out, "{}: {err}", row.path)?,
            _ => writeln!(out, "{}: ?", row.path)?,
        }
    }
    Ok(())
}

#[derive(Debug, Serialize)]
struct FormatRow {
    slot: String,
    routing_value: i32,
    magic: Option<String>,
    caps: Vec<String>,
}

#[derive(Debug, Serialize)]
struct QuarantineRow {
    slot: String,
    magic: Option<String>,
    reason: String,
}

#[derive(Debug, Serialize)]
struct FormatsListing<'a> {
    registered: Vec<FormatRow>,
    quarantined: Vec<QuarantineRow>,
    #[serde(skip_serializing_if = "Option::is_none")]
    autoload: Option<&'a LoadReport>,
}

pub fn formats(
    engine: &Engine,
    report: Option<&LoadReport>,
    json: bool,
    out: &mut impl Write,
) -> Result<()> {
    let registry = engine.registry();
    let registered = registry
        .entries()
        .map(|d| FormatRow {
            slot: d.slot.to_string(),
            routing_value: d.slot.routing_value(),
            magic: show_magic(d.magic.as_deref()),
            caps: d.caps.iter_names().map(|(name, _)| name.to_string()).collect(),
        })
        .collect();
    let quarantined = registry
        .quarantined_entries()
        .map(|q| QuarantineRow {
            slot: q.slot.to_string(),
            magic: show_magic(q.magic.as_deref()),
            reason: q.reason.to_error(q.slot).to_string(),
        })
        .collect();
    let listing = FormatsListing {
        registered,
        quarantined,
        autoload: report,
    };

    if json {
        serde_json::to_writer_pretty(&mut *out, &listing)?;
        writeln!(out)?;
        return Ok(());
    }
    for f in &listing.registered {
        write!(out, "{:<8} {:>3}", f.slot, f.routing_value)?;
        if let Some(m) = &f.magic {
            write!(out, "  magic \"{m}\"")?;
        }
        if !f.caps.is_empty() {
            write!(out, "  caps {}", f.caps.join("|"))?;
        }
        writeln!(out)?;
    }
    for q in &listing.quarantined {
        writeln!(out, "{:<8} quarantined: {}", q.slot, q.reason)?;
    }
    if let Some(r) = report {
        for d in &r.skipped {
            writeln!(out, "skipped: {d}")?;
        }
    }
    Ok(())
}

fn describe(engine: &Engine, ncid: Ncid, out: &mut impl Write) -> Result<()> {
    let summary = engine.inq(ncid)?;
    writeln!(out, "format: {:?}", engine.inq_format(ncid)?)?;

    writeln!(out, "dimensions:")?;
    for dimid in 0..summary.ndims as i32 {
        let dim = engine.inq_dim(ncid, dimid)?;
        let len = if dim.unlimited {
            format!("UNLIMITED ({})", dim.len)
        } else {
            dim.len.to_string()
        };
        writeln!(out, "    {} = {len}", dim.name)?;
    }

    writeln!(out, "variables:")?;
    for varid in 0..summary.nvars as i32 {
        let var = engine.inq_var_all(ncid, varid)?;
        let dims = var
            .dimids
            .iter()
            .map(|d| engine.inq_dim(ncid, *d).map(|i| i.name))
            .collect::<Result<Vec<_>, _>>()?;
        writeln!(out, "    {} {}({})", type_name(var.xtype), var.name, dims.join(", "))?;
    }

    if summary.natts > 0 {
        writeln!(out, "global attributes:")?;
        for attnum in 0..summary.natts as i32 {
            let name = engine.inq_attname(ncid, NC_GLOBAL, attnum)?;
            let att = engine.inq_att(ncid, NC_GLOBAL, &name)?;
            writeln!(out, "    :{name} ({} x {})", type_name(att.xtype), att.len)?;
        }
    }
    Ok(())
}

pub fn inspect(engine: &Engine, path: &str, mode: Mode, out: &mut impl Write) -> Result<()> {
    let request = OpenRequest::new(path, mode);
    let detection = engine
        .detect(&request)
        .with_context(|| format!("detecting {path}"))?;
    let ncid = engine
        .open_with(&request.with_format(detection.slot))
        .with_context(|| format!("opening {path}"))?;
    writeln!(out, "{path}: {} (by {})", detection.slot, detection.rule)?;

    let described = describe(engine, ncid, out);
    let closed = engine.close(ncid).map(|_| ()).context("closing");
    described.and(closed)
}
