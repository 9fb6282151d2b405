//! The pressed HMM database: three companion files sharing a stem, plus an
//! index.
//!
//! - `.h3m` holds the binary models
//! - `.h3f` holds the byte-quantized SSV/MSV filter section
//! - `.h3p` holds the full float profile scores
//! - `.h3i` holds per-model names and `{model, filter, profile}` offsets
//!
//! All integers are little-endian. Each file opens with a magic word; a
//! byte-swapped magic is a byte-order mismatch, anything else is
//! corruption. Conversion from probability form is deterministic, so the
//! reader re-derives the striped form from the `.h3m` record and patches in
//! the recorded offsets.

use std::fs::File;
use std::io::{BufReader, BufWriter, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use crate::alphabet::Alphabet;
use crate::errors::{PromerError, Result};
use crate::model::background::Background;
use crate::model::hmm::Hmm;
use crate::model::optimized::OptimizedProfile;
use crate::model::params::{Cutoffs, EvalueParameters, Offsets};
use crate::model::profile::{Profile, ProfileConfig};

pub const H3M_MAGIC: u32 = 0x504d_336d;
pub const H3F_MAGIC: u32 = 0x504d_3366;
pub const H3I_MAGIC: u32 = 0x504d_3369;
pub const H3P_MAGIC: u32 = 0x504d_3370;
pub const PRESS_VERSION: u32 = 1;

fn companion(path: &Path, suffix: &str) -> PathBuf {
    let mut s = path.as_os_str().to_os_string();
    s.push(suffix);
    PathBuf::from(s)
}

/// True when all three mandatory companions exist next to `path`.
pub fn is_pressed(path: &Path) -> bool {
    companion(path, ".h3m").exists()
        && companion(path, ".h3f").exists()
        && companion(path, ".h3i").exists()
}

// ---------------------------------------------------------------------------
// primitive encode/decode
// ---------------------------------------------------------------------------

fn put_u32<W: Write>(w: &mut W, v: u32) -> Result<()> {
    w.write_all(&v.to_le_bytes())?;
    Ok(())
}

fn put_u64<W: Write>(w: &mut W, v: u64) -> Result<()> {
    w.write_all(&v.to_le_bytes())?;
    Ok(())
}

fn put_f32<W: Write>(w: &mut W, v: f32) -> Result<()> {
    w.write_all(&v.to_le_bytes())?;
    Ok(())
}

fn put_string<W: Write>(w: &mut W, s: &str) -> Result<()> {
    put_u32(w, s.len() as u32)?;
    w.write_all(s.as_bytes())?;
    Ok(())
}

fn put_opt_string<W: Write>(w: &mut W, s: &Option<String>) -> Result<()> {
    match s {
        Some(s) => {
            w.write_all(&[1])?;
            put_string(w, s)
        }
        None => {
            w.write_all(&[0])?;
            Ok(())
        }
    }
}

fn get_u32<R: Read>(r: &mut R) -> Result<u32> {
    let mut buf = [0u8; 4];
    r.read_exact(&mut buf)?;
    Ok(u32::from_le_bytes(buf))
}

fn get_u64<R: Read>(r: &mut R) -> Result<u64> {
    let mut buf = [0u8; 8];
    r.read_exact(&mut buf)?;
    Ok(u64::from_le_bytes(buf))
}

fn get_f32<R: Read>(r: &mut R) -> Result<f32> {
    let mut buf = [0u8; 4];
    r.read_exact(&mut buf)?;
    Ok(f32::from_le_bytes(buf))
}

fn get_u8<R: Read>(r: &mut R) -> Result<u8> {
    let mut buf = [0u8; 1];
    r.read_exact(&mut buf)?;
    Ok(buf[0])
}

fn get_string<R: Read>(r: &mut R) -> Result<String> {
    let len = get_u32(r)? as usize;
    if len > 1 << 20 {
        return Err(PromerError::CorruptFile(format!("string length {len} out of range")));
    }
    let mut buf = vec![0u8; len];
    r.read_exact(&mut buf)?;
    String::from_utf8(buf)
        .map_err(|_| PromerError::CorruptFile("non-UTF8 string field".to_string()))
}

fn get_opt_string<R: Read>(r: &mut R) -> Result<Option<String>> {
    if get_u8(r)? == 0 {
        Ok(None)
    } else {
        get_string(r).map(Some)
    }
}

fn check_magic<R: Read>(r: &mut R, expect: u32, what: &str) -> Result<()> {
    let found = get_u32(r)?;
    if found == expect {
        Ok(())
    } else if found == expect.swap_bytes() {
        Err(PromerError::EndianMismatch(what.to_string()))
    } else {
        Err(PromerError::CorruptFile(format!("bad magic in {what}: {found:#010x}")))
    }
}

// ---------------------------------------------------------------------------
// binary model records
// ---------------------------------------------------------------------------

fn alphabet_tag(a: Alphabet) -> u8 {
    match a {
        Alphabet::Amino => 0,
        Alphabet::Dna => 1,
        Alphabet::Rna => 2,
    }
}

fn alphabet_from_tag(t: u8) -> Result<Alphabet> {
    match t {
        0 => Ok(Alphabet::Amino),
        1 => Ok(Alphabet::Dna),
        2 => Ok(Alphabet::Rna),
        other => Err(PromerError::CorruptFile(format!("unknown alphabet tag {other}"))),
    }
}

pub fn write_hmm_binary<W: Write>(hmm: &Hmm, w: &mut W) -> Result<()> {
    let k = hmm.alphabet.k();
    w.write_all(&[alphabet_tag(hmm.alphabet)])?;
    put_u32(w, hmm.m as u32)?;
    put_string(w, &hmm.name)?;
    put_opt_string(w, &hmm.accession)?;
    put_opt_string(w, &hmm.description)?;
    put_opt_string(w, &hmm.creation_time)?;
    put_u32(w, hmm.command_line.len() as u32)?;
    for cmd in &hmm.command_line {
        put_string(w, cmd)?;
    }
    for node in 0..=hmm.m {
        for x in 0..k {
            put_f32(w, hmm.mat[node][x])?;
        }
        for x in 0..k {
            put_f32(w, hmm.ins[node][x])?;
        }
        for t in hmm.t[node] {
            put_f32(w, t)?;
        }
    }
    match &hmm.composition {
        Some(comp) => {
            w.write_all(&[1])?;
            for &c in comp {
                put_f32(w, c)?;
            }
        }
        None => w.write_all(&[0])?,
    }
    match hmm.checksum {
        Some(c) => {
            w.write_all(&[1])?;
            put_u32(w, c)?;
        }
        None => w.write_all(&[0])?,
    }
    put_opt_string(w, &hmm.consensus)?;
    put_opt_string(w, &hmm.consensus_structure)?;
    put_opt_string(w, &hmm.consensus_accessibility)?;
    put_opt_string(w, &hmm.reference)?;
    match &hmm.map {
        Some(map) => {
            w.write_all(&[1])?;
            for &col in map {
                put_u32(w, col as u32)?;
            }
        }
        None => w.write_all(&[0])?,
    }
    match hmm.nseq {
        Some(n) => {
            w.write_all(&[1])?;
            put_u32(w, n)?;
        }
        None => w.write_all(&[0])?,
    }
    match hmm.nseq_effective {
        Some(n) => {
            w.write_all(&[1])?;
            put_f32(w, n)?;
        }
        None => w.write_all(&[0])?,
    }
    match &hmm.evalue_parameters {
        Some(p) => {
            w.write_all(&[1])?;
            for v in [p.m_mu, p.m_lambda, p.v_mu, p.v_lambda, p.f_tau, p.f_lambda] {
                put_f32(w, v)?;
            }
        }
        None => w.write_all(&[0])?,
    }
    for pair in [hmm.cutoffs.gathering, hmm.cutoffs.trusted, hmm.cutoffs.noise] {
        match pair {
            Some((a, b)) => {
                w.write_all(&[1])?;
                put_f32(w, a)?;
                put_f32(w, b)?;
            }
            None => w.write_all(&[0])?,
        }
    }
    Ok(())
}

pub fn read_hmm_binary<R: Read>(r: &mut R) -> Result<Hmm> {
    let alphabet = alphabet_from_tag(get_u8(r)?)?;
    let k = alphabet.k();
    let m = get_u32(r)? as usize;
    if m == 0 || m > 1 << 20 {
        return Err(PromerError::CorruptFile(format!("model length {m} out of range")));
    }
    let name = get_string(r)?;
    let mut hmm = Hmm::new(alphabet, m, &name)?;
    hmm.accession = get_opt_string(r)?;
    hmm.description = get_opt_string(r)?;
    hmm.creation_time = get_opt_string(r)?;
    let ncmd = get_u32(r)? as usize;
    if ncmd > 1 << 16 {
        return Err(PromerError::CorruptFile("command list out of range".to_string()));
    }
    for _ in 0..ncmd {
        let cmd = get_string(r)?;
        hmm.command_line.push(cmd);
    }
    for node in 0..=m {
        for x in 0..k {
            hmm.mat[node][x] = get_f32(r)?;
        }
        for x in 0..k {
            hmm.ins[node][x] = get_f32(r)?;
        }
        for t in 0..7 {
            hmm.t[node][t] = get_f32(r)?;
        }
    }
    if get_u8(r)? == 1 {
        let mut comp = vec![0.0f32; k];
        for c in comp.iter_mut() {
            *c = get_f32(r)?;
        }
        hmm.composition = Some(comp);
    }
    if get_u8(r)? == 1 {
        hmm.checksum = Some(get_u32(r)?);
    }
    hmm.consensus = get_opt_string(r)?;
    hmm.consensus_structure = get_opt_string(r)?;
    hmm.consensus_accessibility = get_opt_string(r)?;
    hmm.reference = get_opt_string(r)?;
    if get_u8(r)? == 1 {
        let mut map = Vec::with_capacity(m);
        for _ in 0..m {
            map.push(get_u32(r)? as usize);
        }
        hmm.map = Some(map);
    }
    if get_u8(r)? == 1 {
        hmm.nseq = Some(get_u32(r)?);
    }
    if get_u8(r)? == 1 {
        hmm.nseq_effective = Some(get_f32(r)?);
    }
    if get_u8(r)? == 1 {
        let mut vals = [0.0f32; 6];
        for v in vals.iter_mut() {
            *v = get_f32(r)?;
        }
        hmm.evalue_parameters = Some(EvalueParameters {
            m_mu: vals[0],
            m_lambda: vals[1],
            v_mu: vals[2],
            v_lambda: vals[3],
            f_tau: vals[4],
            f_lambda: vals[5],
        });
    }
    let mut cutoffs = Cutoffs::default();
    for slot in [&mut cutoffs.gathering, &mut cutoffs.trusted, &mut cutoffs.noise] {
        if get_u8(r)? == 1 {
            let a = get_f32(r)?;
            let b = get_f32(r)?;
            *slot = Some((a, b));
        }
    }
    hmm.cutoffs = cutoffs;
    Ok(hmm)
}

// ---------------------------------------------------------------------------
// press writer
// ---------------------------------------------------------------------------

struct IndexEntry {
    name: String,
    offsets: Offsets,
}

/// Press models into the four companion files next to `path`. Returns the
/// number of models written.
pub fn press<'a, I>(hmms: I, path: &Path) -> Result<usize>
where
    I: IntoIterator<Item = &'a Hmm>,
{
    let mut fm = BufWriter::new(File::create(companion(path, ".h3m"))?);
    let mut ff = BufWriter::new(File::create(companion(path, ".h3f"))?);
    let mut fp = BufWriter::new(File::create(companion(path, ".h3p"))?);
    let mut fi = BufWriter::new(File::create(companion(path, ".h3i"))?);

    put_u32(&mut fm, H3M_MAGIC)?;
    put_u32(&mut fm, PRESS_VERSION)?;
    put_u32(&mut ff, H3F_MAGIC)?;
    put_u32(&mut ff, PRESS_VERSION)?;
    put_u32(&mut fp, H3P_MAGIC)?;
    put_u32(&mut fp, PRESS_VERSION)?;

    let mut entries: Vec<IndexEntry> = Vec::new();
    let mut m_off = 8u64;
    let mut f_off = 8u64;
    let mut p_off = 8u64;

    for hmm in hmms {
        let bg = Background::new(hmm.alphabet);
        let mut gm = Profile::new(hmm.alphabet);
        gm.configure(hmm, &bg, ProfileConfig::default())?;
        let om = OptimizedProfile::from_profile(&gm)?;

        let mut model_buf = Vec::new();
        write_hmm_binary(hmm, &mut model_buf)?;
        fm.write_all(&model_buf)?;

        let mut filter_buf = Vec::new();
        write_filter_record(&om, &mut filter_buf)?;
        ff.write_all(&filter_buf)?;

        let mut profile_buf = Vec::new();
        write_profile_record(&gm, &mut profile_buf)?;
        fp.write_all(&profile_buf)?;

        entries.push(IndexEntry {
            name: hmm.name.clone(),
            offsets: Offsets {
                model: Some(m_off),
                filter: Some(f_off),
                profile: Some(p_off),
            },
        });
        m_off += model_buf.len() as u64;
        f_off += filter_buf.len() as u64;
        p_off += profile_buf.len() as u64;
    }

    put_u32(&mut fi, H3I_MAGIC)?;
    put_u32(&mut fi, PRESS_VERSION)?;
    put_u32(&mut fi, entries.len() as u32)?;
    for entry in &entries {
        put_string(&mut fi, &entry.name)?;
        put_u64(&mut fi, entry.offsets.model.unwrap_or(0))?;
        put_u64(&mut fi, entry.offsets.filter.unwrap_or(0))?;
        put_u64(&mut fi, entry.offsets.profile.unwrap_or(0))?;
    }
    fm.flush()?;
    ff.flush()?;
    fp.flush()?;
    fi.flush()?;
    Ok(entries.len())
}

fn write_filter_record<W: Write>(om: &OptimizedProfile, w: &mut W) -> Result<()> {
    put_u32(w, om.m() as u32)?;
    put_u32(w, om.qb as u32)?;
    w.write_all(&[om.tbm, om.tec, om.base, om.bias])?;
    put_u32(w, om.sbv.len() as u32)?;
    w.write_all(&om.sbv)?;
    Ok(())
}

fn write_profile_record<W: Write>(gm: &Profile, w: &mut W) -> Result<()> {
    put_u32(w, gm.m as u32)?;
    put_u32(w, gm.alphabet.kp() as u32)?;
    for row in &gm.tsc {
        for &v in row {
            put_f32(w, v)?;
        }
    }
    for row in &gm.rsc {
        for &v in row {
            put_f32(w, v)?;
        }
    }
    put_string(w, &gm.consensus)?;
    Ok(())
}

// ---------------------------------------------------------------------------
// pressed reader
// ---------------------------------------------------------------------------

/// Forward iterator over the optimized profiles of a pressed database.
#[derive(Debug)]
pub struct HmmPressedFile {
    path: PathBuf,
    model_file: BufReader<File>,
    entries: Vec<(String, Offsets)>,
    cursor: usize,
    closed: bool,
}

impl HmmPressedFile {
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        if !is_pressed(&path) {
            return Err(PromerError::InvalidFormat(format!(
                "no pressed database at '{}'",
                path.display()
            )));
        }
        // Validate every companion's magic up front.
        let mut fi = BufReader::new(File::open(companion(&path, ".h3i"))?);
        check_magic(&mut fi, H3I_MAGIC, "index file")?;
        let version = get_u32(&mut fi)?;
        if version != PRESS_VERSION {
            return Err(PromerError::UnsupportedVersion(format!("pressed v{version}")));
        }
        let mut ff = BufReader::new(File::open(companion(&path, ".h3f"))?);
        check_magic(&mut ff, H3F_MAGIC, "filter file")?;
        // The full-profile companion is optional.
        if let Ok(file) = File::open(companion(&path, ".h3p")) {
            let mut fp = BufReader::new(file);
            check_magic(&mut fp, H3P_MAGIC, "profile file")?;
        }
        let n = get_u32(&mut fi)? as usize;
        let mut entries = Vec::with_capacity(n);
        for _ in 0..n {
            let name = get_string(&mut fi)?;
            let model = get_u64(&mut fi)?;
            let filter = get_u64(&mut fi)?;
            let profile = get_u64(&mut fi)?;
            entries.push((
                name,
                Offsets {
                    model: Some(model),
                    filter: Some(filter),
                    profile: Some(profile),
                },
            ));
        }

        let mut model_file = BufReader::new(File::open(companion(&path, ".h3m"))?);
        check_magic(&mut model_file, H3M_MAGIC, "model file")?;
        let version = get_u32(&mut model_file)?;
        if version != PRESS_VERSION {
            return Err(PromerError::UnsupportedVersion(format!("pressed v{version}")));
        }
        Ok(HmmPressedFile { path, model_file, entries, cursor: 0, closed: false })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn rewind(&mut self) -> Result<()> {
        if self.closed {
            return Err(PromerError::InvalidParameter("file is closed".to_string()));
        }
        self.cursor = 0;
        Ok(())
    }

    pub fn close(&mut self) {
        self.closed = true;
    }

    pub fn closed(&self) -> bool {
        self.closed
    }

    /// Read the model at `index`, regardless of the cursor.
    pub fn read_at(&mut self, index: usize) -> Result<OptimizedProfile> {
        let (_, offsets) = self.entries.get(index).cloned().ok_or_else(|| {
            PromerError::InvalidParameter(format!("model index {index} out of range"))
        })?;
        let off = offsets.model.expect("index entries always carry offsets");
        self.model_file.seek(SeekFrom::Start(off))?;
        let hmm = read_hmm_binary(&mut self.model_file)?;
        let bg = Background::new(hmm.alphabet);
        let mut gm = Profile::new(hmm.alphabet);
        gm.configure(&hmm, &bg, ProfileConfig::default())?;
        let mut om = OptimizedProfile::from_profile(&gm)?;
        om.offsets = offsets;
        Ok(om)
    }

    pub fn read_next(&mut self) -> Result<Option<OptimizedProfile>> {
        if self.closed {
            return Err(PromerError::InvalidParameter("file is closed".to_string()));
        }
        if self.cursor >= self.entries.len() {
            return Ok(None);
        }
        let om = self.read_at(self.cursor)?;
        self.cursor += 1;
        Ok(Some(om))
    }
}

impl Iterator for HmmPressedFile {
    type Item = Result<OptimizedProfile>;

    fn next(&mut self) -> Option<Self::Item> {
        match self.read_next() {
            Ok(Some(om)) => Some(Ok(om)),
            Ok(None) => None,
            Err(e) => Some(Err(e)),
        }
    }
}
