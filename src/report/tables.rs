//! Human-readable result tables.

use std::io::{self, Write};

use crate::errors::PromerError;
use crate::results::tophits::TopHits;

/// Output table layouts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TableFormat {
    /// One line per reported hit.
    Targets,
    /// One line per reported domain of each reported hit.
    Domains,
    /// Condensed three-block layout: sequence scores, domain scores, then
    /// domain alignments.
    Pfam,
}

impl std::str::FromStr for TableFormat {
    type Err = PromerError;

    fn from_str(s: &str) -> Result<Self, PromerError> {
        match s.to_ascii_lowercase().as_str() {
            "targets" => Ok(TableFormat::Targets),
            "domains" | "domain" => Ok(TableFormat::Domains),
            "pfam" => Ok(TableFormat::Pfam),
            other => Err(PromerError::InvalidParameter(format!(
                "unknown table format '{other}'"
            ))),
        }
    }
}

pub fn write_table<W: Write>(
    hits: &TopHits,
    out: &mut W,
    format: TableFormat,
    header: bool,
) -> io::Result<()> {
    match format {
        TableFormat::Targets => write_targets(hits, out, header),
        TableFormat::Domains => write_domains(hits, out, header),
        TableFormat::Pfam => write_pfam(hits, out, header),
    }
}

fn dash(s: &Option<String>) -> &str {
    s.as_deref().unwrap_or("-")
}

fn write_targets<W: Write>(hits: &TopHits, out: &mut W, header: bool) -> io::Result<()> {
    if header {
        writeln!(
            out,
            "{:<20} {:<10} {:<20} {:<10} {:>9} {:>7} {:>6} {:>9} {:>7} {:>6} {:>4} {:>3} {}",
            "# target name",
            "accession",
            "query name",
            "accession",
            "E-value",
            "score",
            "bias",
            "dom-E",
            "dom-sc",
            "bias",
            "ndom",
            "inc",
            "description"
        )?;
    }
    for hit in hits.reported() {
        let best = hit.best_domain();
        writeln!(
            out,
            "{:<20} {:<10} {:<20} {:<10} {:>9.2e} {:>7.1} {:>6.1} {:>9.2e} {:>7.1} {:>6.1} {:>4} {:>3} {}",
            hit.name,
            dash(&hit.accession),
            hits.query_name,
            dash(&hits.query_accession),
            hit.evalue,
            hit.score,
            hit.bias,
            best.map_or(f64::INFINITY, |d| d.c_evalue),
            best.map_or(0.0, |d| d.score),
            best.map_or(0.0, |d| d.bias),
            hit.domains.reported_len(),
            if hit.included { "!" } else { "?" },
            dash(&hit.description),
        )?;
    }
    Ok(())
}

fn write_domains<W: Write>(hits: &TopHits, out: &mut W, header: bool) -> io::Result<()> {
    if header {
        writeln!(
            out,
            "{:<20} {:<20} {:>3} {:>3} {:>9} {:>9} {:>7} {:>6} {:>5} {:>5} {:>5} {:>5} {:>5} {:>5} {:>3}",
            "# target name",
            "query name",
            "#",
            "of",
            "c-Evalue",
            "i-Evalue",
            "score",
            "bias",
            "hmmf",
            "hmmt",
            "alif",
            "alit",
            "envf",
            "envt",
            "inc"
        )?;
    }
    for hit in hits.reported() {
        let ndom = hit.domains.reported_len();
        for (idx, dom) in hit.domains.reported().enumerate() {
            writeln!(
                out,
                "{:<20} {:<20} {:>3} {:>3} {:>9.2e} {:>9.2e} {:>7.1} {:>6.1} {:>5} {:>5} {:>5} {:>5} {:>5} {:>5} {:>3}",
                hit.name,
                hits.query_name,
                idx + 1,
                ndom,
                dom.c_evalue,
                dom.i_evalue,
                dom.score,
                dom.bias,
                dom.hmm_from,
                dom.hmm_to,
                dom.ali_from,
                dom.ali_to,
                dom.env_from,
                dom.env_to,
                if dom.included { "!" } else { "?" },
            )?;
        }
    }
    Ok(())
}

fn write_pfam<W: Write>(hits: &TopHits, out: &mut W, header: bool) -> io::Result<()> {
    // Block 1: per-sequence scores.
    writeln!(out, "# Sequence scores (query: {})", hits.query_name)?;
    if header {
        writeln!(
            out,
            "{:<20} {:>9} {:>7} {:>6} {:>4} {}",
            "# name", "E-value", "score", "bias", "ndom", "description"
        )?;
    }
    for hit in hits.reported() {
        writeln!(
            out,
            "{:<20} {:>9.2e} {:>7.1} {:>6.1} {:>4} {}",
            hit.name,
            hit.evalue,
            hit.score,
            hit.bias,
            hit.domains.reported_len(),
            dash(&hit.description),
        )?;
    }

    // Block 2: per-domain scores.
    writeln!(out, "# Domain scores")?;
    if header {
        writeln!(
            out,
            "{:<20} {:>3} {:>7} {:>6} {:>9} {:>9} {:>5} {:>5} {:>5} {:>5}",
            "# name", "#", "score", "bias", "c-Evalue", "i-Evalue", "hmmf", "hmmt", "envf", "envt"
        )?;
    }
    for hit in hits.reported() {
        for (idx, dom) in hit.domains.reported().enumerate() {
            writeln!(
                out,
                "{:<20} {:>3} {:>7.1} {:>6.1} {:>9.2e} {:>9.2e} {:>5} {:>5} {:>5} {:>5}",
                hit.name,
                idx + 1,
                dom.score,
                dom.bias,
                dom.c_evalue,
                dom.i_evalue,
                dom.hmm_from,
                dom.hmm_to,
                dom.env_from,
                dom.env_to,
            )?;
        }
    }

    // Block 3: per-domain alignments.
    writeln!(out, "# Alignments")?;
    for hit in hits.reported() {
        let ndom = hit.domains.reported_len();
        for (idx, dom) in hit.domains.reported().enumerate() {
            let ali = &dom.alignment;
            writeln!(
                out,
                ">> {} domain {} of {} ({}..{})",
                hit.name,
                idx + 1,
                ndom,
                ali.target_from,
                ali.target_to,
            )?;
            if ali.is_empty() {
                continue;
            }
            writeln!(out, "  {:<20} {}", ali.hmm_name, ali.hmm_line)?;
            writeln!(out, "  {:<20} {}", "", ali.mid_line)?;
            writeln!(out, "  {:<20} {}", ali.target_name, ali.target_line)?;
            writeln!(out, "  {:<20} {}", "PP", ali.posterior_line)?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn format_tags_parse() {
        assert_eq!(TableFormat::from_str("targets").unwrap(), TableFormat::Targets);
        assert_eq!(TableFormat::from_str("domain").unwrap(), TableFormat::Domains);
        assert_eq!(TableFormat::from_str("pfam").unwrap(), TableFormat::Pfam);
        assert!(TableFormat::from_str("xml").is_err());
    }
}
