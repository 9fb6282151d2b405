//! The line-oriented, versioned HMM text format.
//!
//! A record is a magic-tagged header block, a columnar `HMM` section with
//! one emission/transition triplet per node, and a `//` terminator.
//! Probabilities are stored as negative natural logs, `*` for zero.

use std::fs::File;
use std::io::{BufRead, BufReader, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use crate::alphabet::Alphabet;
use crate::errors::{PromerError, Result};
use crate::model::hmm::{Hmm, T_DD, T_DM, T_II, T_IM, T_MD, T_MI, T_MM};
use crate::model::params::EvalueParameters;

/// Format tag written at the top of every record.
pub const FORMAT_TAG: &str = "HMMER3/f";

fn prob_to_field(p: f32) -> String {
    if p > 0.0 {
        format!("{:.5}", -p.ln())
    } else {
        "*".to_string()
    }
}

fn field_to_prob(field: &str) -> Result<f32> {
    if field == "*" {
        return Ok(0.0);
    }
    field
        .parse::<f32>()
        .map(|v| (-v).exp())
        .map_err(|_| PromerError::InvalidFormat(format!("bad probability field '{field}'")))
}

/// Write one model in text form.
pub fn write_hmm<W: Write>(hmm: &Hmm, out: &mut W) -> Result<()> {
    let k = hmm.alphabet.k();
    writeln!(out, "{FORMAT_TAG} [promer {}]", env!("CARGO_PKG_VERSION"))?;
    writeln!(out, "NAME  {}", hmm.name)?;
    if let Some(acc) = &hmm.accession {
        writeln!(out, "ACC   {acc}")?;
    }
    if let Some(desc) = &hmm.description {
        writeln!(out, "DESC  {desc}")?;
    }
    writeln!(out, "LENG  {}", hmm.m)?;
    writeln!(out, "ALPH  {}", hmm.alphabet.name())?;
    writeln!(out, "RF    {}", if hmm.reference.is_some() { "yes" } else { "no" })?;
    writeln!(out, "MM    no")?;
    writeln!(out, "CONS  {}", if hmm.consensus.is_some() { "yes" } else { "no" })?;
    writeln!(out, "CS    {}", if hmm.consensus_structure.is_some() { "yes" } else { "no" })?;
    writeln!(out, "MAP   {}", if hmm.map.is_some() { "yes" } else { "no" })?;
    if let Some(date) = &hmm.creation_time {
        writeln!(out, "DATE  {date}")?;
    }
    for (i, com) in hmm.command_line.iter().enumerate() {
        writeln!(out, "COM   [{}] {com}", i + 1)?;
    }
    if let Some(nseq) = hmm.nseq {
        writeln!(out, "NSEQ  {nseq}")?;
    }
    if let Some(effn) = hmm.nseq_effective {
        writeln!(out, "EFFN  {effn:.6}")?;
    }
    if let Some(cksum) = hmm.checksum {
        writeln!(out, "CKSUM {cksum}")?;
    }
    for (tag, pair) in [
        ("GA", hmm.cutoffs.gathering),
        ("TC", hmm.cutoffs.trusted),
        ("NC", hmm.cutoffs.noise),
    ] {
        if let Some((s1, s2)) = pair {
            writeln!(out, "{tag}    {s1:.2} {s2:.2}")?;
        }
    }
    if let Some(p) = &hmm.evalue_parameters {
        writeln!(out, "STATS LOCAL MSV      {:.5} {:.5}", p.m_mu, p.m_lambda)?;
        writeln!(out, "STATS LOCAL VITERBI  {:.5} {:.5}", p.v_mu, p.v_lambda)?;
        writeln!(out, "STATS LOCAL FORWARD  {:.5} {:.5}", p.f_tau, p.f_lambda)?;
    }

    write!(out, "HMM     ")?;
    for x in 0..k {
        write!(out, "{:>9} ", hmm.alphabet.sym(x as u8) as char)?;
    }
    writeln!(out)?;
    writeln!(
        out,
        "        {:>9} {:>9} {:>9} {:>9} {:>9} {:>9} {:>9}",
        "m->m", "m->i", "m->d", "i->m", "i->i", "d->m", "d->d"
    )?;

    if let Some(comp) = &hmm.composition {
        write!(out, "  COMPO ")?;
        for &p in comp {
            write!(out, "{:>9} ", prob_to_field(p))?;
        }
        writeln!(out)?;
    }
    // node 0: insert emissions and begin transitions
    write_insert_and_transitions(hmm, 0, out)?;
    for node in 1..=hmm.m {
        write!(out, "{node:>7} ")?;
        for x in 0..k {
            write!(out, "{:>9} ", prob_to_field(hmm.mat[node][x]))?;
        }
        let map = hmm
            .map
            .as_ref()
            .and_then(|m| m.get(node - 1))
            .map_or("-".to_string(), |c| c.to_string());
        let cons = hmm
            .consensus
            .as_ref()
            .and_then(|c| c.chars().nth(node - 1))
            .unwrap_or('-');
        let rf = hmm
            .reference
            .as_ref()
            .and_then(|r| r.chars().nth(node - 1))
            .unwrap_or('-');
        let cs = hmm
            .consensus_structure
            .as_ref()
            .and_then(|c| c.chars().nth(node - 1))
            .unwrap_or('-');
        writeln!(out, "{map:>6} {cons} {rf} - {cs}")?;
        write_insert_and_transitions(hmm, node, out)?;
    }
    writeln!(out, "//")?;
    Ok(())
}

fn write_insert_and_transitions<W: Write>(hmm: &Hmm, node: usize, out: &mut W) -> Result<()> {
    write!(out, "        ")?;
    for x in 0..hmm.alphabet.k() {
        write!(out, "{:>9} ", prob_to_field(hmm.ins[node][x]))?;
    }
    writeln!(out)?;
    write!(out, "        ")?;
    for t in [T_MM, T_MI, T_MD, T_IM, T_II, T_DM, T_DD] {
        write!(out, "{:>9} ", prob_to_field(hmm.t[node][t]))?;
    }
    writeln!(out)?;
    Ok(())
}

/// A forward iterator over the models in a text HMM file.
#[derive(Debug)]
pub struct HmmFile {
    reader: BufReader<File>,
    path: PathBuf,
    closed: bool,
    records_read: usize,
}

impl HmmFile {
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let file = File::open(path.as_ref())?;
        Ok(HmmFile {
            reader: BufReader::new(file),
            path: path.as_ref().to_path_buf(),
            closed: false,
            records_read: 0,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Restart iteration from the first record.
    pub fn rewind(&mut self) -> Result<()> {
        if self.closed {
            return Err(PromerError::InvalidParameter("file is closed".to_string()));
        }
        self.reader.seek(SeekFrom::Start(0))?;
        self.records_read = 0;
        Ok(())
    }

    /// Close the descriptor. Idempotent.
    pub fn close(&mut self) {
        self.closed = true;
    }

    pub fn closed(&self) -> bool {
        self.closed
    }

    /// True when a pressed companion set exists next to this file.
    pub fn is_pressed(&self) -> bool {
        crate::io::pressed::is_pressed(&self.path)
    }

    fn next_line(&mut self) -> Result<Option<String>> {
        let mut line = String::new();
        loop {
            line.clear();
            let n = self.reader.read_line(&mut line)?;
            if n == 0 {
                return Ok(None);
            }
            if !line.trim().is_empty() {
                return Ok(Some(line.trim_end().to_string()));
            }
        }
    }

    /// Read the next model, or None at a clean end of file.
    pub fn read_next(&mut self) -> Result<Option<Hmm>> {
        if self.closed {
            return Err(PromerError::InvalidParameter("file is closed".to_string()));
        }
        let magic = match self.next_line()? {
            None => return Ok(None),
            Some(line) => line,
        };
        if !magic.starts_with(FORMAT_TAG) {
            if magic.starts_with("HMMER") {
                return Err(PromerError::UnsupportedVersion(
                    magic.split_whitespace().next().unwrap_or("").to_string(),
                ));
            }
            if self.records_read > 0 {
                // Trailing garbage after a valid final record.
                return Ok(None);
            }
            return Err(PromerError::InvalidFormat(format!(
                "not an HMM file: first line '{magic}'"
            )));
        }

        // Header section.
        let mut name: Option<String> = None;
        let mut accession = None;
        let mut description = None;
        let mut leng: Option<usize> = None;
        let mut alphabet: Option<Alphabet> = None;
        let mut creation_time = None;
        let mut command_line = Vec::new();
        let mut nseq = None;
        let mut nseq_effective = None;
        let mut checksum: Option<u32> = None;
        let mut cutoffs = crate::model::params::Cutoffs::default();
        let mut stats: [(f32, f32); 3] = [(0.0, 0.0); 3];
        let mut stats_seen = 0u8;

        let header_err = |what: &str| PromerError::InvalidFormat(format!("bad {what} line"));
        loop {
            let line = self
                .next_line()?
                .ok_or_else(|| PromerError::InvalidFormat("truncated header".to_string()))?;
            let (tag, rest) = match line.split_once(char::is_whitespace) {
                Some((t, r)) => (t, r.trim()),
                None => (line.as_str(), ""),
            };
            match tag {
                "NAME" => name = Some(rest.to_string()),
                "ACC" => accession = Some(rest.to_string()),
                "DESC" => description = Some(rest.to_string()),
                "LENG" => leng = Some(rest.parse().map_err(|_| header_err("LENG"))?),
                "MAXL" => {}
                "ALPH" => alphabet = Some(Alphabet::from_name(rest)?),
                "RF" | "MM" | "CONS" | "CS" | "MAP" => {}
                "DATE" => creation_time = Some(rest.to_string()),
                "COM" => {
                    let cmd = rest.split_once(' ').map(|(_, c)| c).unwrap_or(rest);
                    command_line.push(cmd.to_string());
                }
                "NSEQ" => nseq = Some(rest.parse().map_err(|_| header_err("NSEQ"))?),
                "EFFN" => nseq_effective = Some(rest.parse().map_err(|_| header_err("EFFN"))?),
                "CKSUM" => checksum = Some(rest.parse().map_err(|_| header_err("CKSUM"))?),
                "GA" | "TC" | "NC" => {
                    let mut it = rest.split_whitespace();
                    let a = it
                        .next()
                        .and_then(|v| v.parse::<f32>().ok())
                        .ok_or_else(|| header_err(tag))?;
                    let b = it
                        .next()
                        .and_then(|v| v.parse::<f32>().ok())
                        .ok_or_else(|| header_err(tag))?;
                    match tag {
                        "GA" => cutoffs.gathering = Some((a, b)),
                        "TC" => cutoffs.trusted = Some((a, b)),
                        _ => cutoffs.noise = Some((a, b)),
                    }
                }
                "STATS" => {
                    let mut it = rest.split_whitespace();
                    let _local = it.next();
                    let which = it.next().unwrap_or("");
                    let a = it
                        .next()
                        .and_then(|v| v.parse::<f32>().ok())
                        .ok_or_else(|| header_err("STATS"))?;
                    let b = it
                        .next()
                        .and_then(|v| v.parse::<f32>().ok())
                        .ok_or_else(|| header_err("STATS"))?;
                    let idx = match which {
                        "MSV" => 0,
                        "VITERBI" => 1,
                        "FORWARD" => 2,
                        other => {
                            return Err(PromerError::InvalidFormat(format!(
                                "unknown STATS kind '{other}'"
                            )))
                        }
                    };
                    stats[idx] = (a, b);
                    stats_seen |= 1 << idx;
                }
                "HMM" => break,
                other => {
                    return Err(PromerError::InvalidFormat(format!(
                        "unknown header tag '{other}'"
                    )))
                }
            }
        }

        let name = name.ok_or_else(|| PromerError::InvalidFormat("missing NAME".to_string()))?;
        let m = leng.ok_or_else(|| PromerError::InvalidFormat("missing LENG".to_string()))?;
        let alphabet =
            alphabet.ok_or_else(|| PromerError::InvalidFormat("missing ALPH".to_string()))?;
        let k = alphabet.k();
        let mut hmm = Hmm::new(alphabet, m, &name)?;
        hmm.accession = accession;
        hmm.description = description;
        hmm.creation_time = creation_time;
        hmm.command_line = command_line;
        hmm.nseq = nseq;
        hmm.nseq_effective = nseq_effective;
        hmm.cutoffs = cutoffs;
        if stats_seen == 0b111 {
            hmm.evalue_parameters = Some(EvalueParameters {
                m_mu: stats[0].0,
                m_lambda: stats[0].1,
                v_mu: stats[1].0,
                v_lambda: stats[1].1,
                f_tau: stats[2].0,
                f_lambda: stats[2].1,
            });
        }

        // transition header line (already past the symbol line "HMM ...")
        self.next_line()?
            .ok_or_else(|| PromerError::InvalidFormat("truncated HMM section".to_string()))?;

        let mut parse_probs = |line: &str, n: usize| -> Result<Vec<f32>> {
            let fields: Vec<&str> = line.split_whitespace().collect();
            if fields.len() < n {
                return Err(PromerError::InvalidFormat(format!(
                    "expected {n} probability fields, found {}",
                    fields.len()
                )));
            }
            fields[..n].iter().map(|f| field_to_prob(f)).collect()
        };

        // optional COMPO row, then node 0 insert/transition rows
        let mut line = self
            .next_line()?
            .ok_or_else(|| PromerError::InvalidFormat("truncated model".to_string()))?;
        if line.trim_start().starts_with("COMPO") {
            let rest = line.trim_start().trim_start_matches("COMPO");
            hmm.composition = Some(parse_probs(rest, k)?);
            line = self
                .next_line()?
                .ok_or_else(|| PromerError::InvalidFormat("truncated model".to_string()))?;
        }
        hmm.ins[0] = parse_probs(&line, k)?;
        let tline = self
            .next_line()?
            .ok_or_else(|| PromerError::InvalidFormat("truncated model".to_string()))?;
        let t = parse_probs(&tline, 7)?;
        hmm.t[0].copy_from_slice(&t);

        let mut consensus = String::new();
        let mut reference = String::new();
        let mut structure = String::new();
        let mut map = Vec::new();
        let mut have_map = false;
        for node in 1..=m {
            let mline = self
                .next_line()?
                .ok_or_else(|| PromerError::InvalidFormat("truncated model".to_string()))?;
            let fields: Vec<&str> = mline.split_whitespace().collect();
            if fields.len() < 1 + k {
                return Err(PromerError::InvalidFormat(format!("short node line at {node}")));
            }
            let parsed: usize = fields[0]
                .parse()
                .map_err(|_| PromerError::InvalidFormat(format!("bad node index '{}'", fields[0])))?;
            if parsed != node {
                return Err(PromerError::InvalidFormat(format!(
                    "node index {parsed} where {node} expected"
                )));
            }
            for (x, f) in fields[1..=k].iter().enumerate() {
                hmm.mat[node][x] = field_to_prob(f)?;
            }
            if let Some(mapf) = fields.get(1 + k) {
                if let Ok(col) = mapf.parse::<usize>() {
                    map.push(col);
                    have_map = true;
                }
            }
            if let Some(cons) = fields.get(2 + k) {
                consensus.push_str(cons);
            }
            if let Some(rf) = fields.get(3 + k) {
                reference.push_str(rf);
            }
            if let Some(cs) = fields.get(5 + k) {
                structure.push_str(cs);
            }
            let iline = self
                .next_line()?
                .ok_or_else(|| PromerError::InvalidFormat("truncated model".to_string()))?;
            hmm.ins[node] = parse_probs(&iline, k)?;
            let tline = self
                .next_line()?
                .ok_or_else(|| PromerError::InvalidFormat("truncated model".to_string()))?;
            let t = parse_probs(&tline, 7)?;
            hmm.t[node].copy_from_slice(&t);
        }
        let end = self
            .next_line()?
            .ok_or_else(|| PromerError::InvalidFormat("missing record terminator".to_string()))?;
        if end.trim() != "//" {
            return Err(PromerError::InvalidFormat(format!(
                "expected '//', found '{end}'"
            )));
        }

        if !consensus.is_empty() {
            hmm.consensus = Some(consensus);
        }
        if !reference.is_empty() && reference.chars().any(|c| c != '-') {
            hmm.reference = Some(reference);
        }
        if !structure.is_empty() && structure.chars().any(|c| c != '-') {
            hmm.consensus_structure = Some(structure);
        }
        if have_map {
            hmm.map = Some(map);
        }
        hmm.fix_boundary_nodes();
        self.records_read += 1;
        Ok(Some(hmm))
    }
}

impl Iterator for HmmFile {
    type Item = Result<Hmm>;

    fn next(&mut self) -> Option<Self::Item> {
        match self.read_next() {
            Ok(Some(hmm)) => Some(Ok(hmm)),
            Ok(None) => None,
            Err(e) => Some(Err(e)),
        }
    }
}
