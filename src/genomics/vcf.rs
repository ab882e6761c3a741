//! VCFv4.1 rendering of assembled multi-sample genotype rows.

use std::io::{self, Write};

use crate::genomics::{GenotypeCall, SiteAllele};

const META: &str = "##FORMAT=<ID=GT,Number=1,Type=String,Description=\"Genotype\">
##FORMAT=<ID=AD,Number=.,Type=Integer,Description=\"Allelic depths for the reference and alternate alleles in the order listed\">
##FORMAT=<ID=GL,Number=G,Type=Integer,Description=\"Genotype likelihoods for 0/0, 0/1, 1/1, or  0/0, 0/1, 0/2, 1/1, 1/2, 2/2 if 2 alt alleles\">
##INFO=<ID=DP,Number=1,Type=Integer,Description=\"Total Depth\">
##INFO=<ID=NZ,Number=1,Type=Integer,Description=\"Number of taxa with called genotypes\">
##INFO=<ID=AD,Number=.,Type=Integer,Description=\"Total allelelic depths in order listed starting with REF\">
##INFO=<ID=AC,Number=.,Type=Integer,Description=\"Numbers of ALT alleles in order listed\">
##INFO=<ID=IL,Number=.,Type=Integer,Description=\"Indel length of ALT alleles in order listed\">
##INFO=<ID=HT,Number=1,Type=Integer,Description=\"Number of heterozygotes\">
##INFO=<ID=MAF,Number=1,Type=Float,Description=\"Minor allele frequency\">
##ALT=<ID=DEL,Description=\"Deletion\">
##ALT=<ID=INS,Description=\"Insertion\">
";

/// Write the VCFv4.1 header, samples in the given order.
pub fn write_header<W: Write>(
    writer: &mut W,
    samples: &[String],
    file_date: Option<&str>,
) -> io::Result<()> {
    writer.write_all(b"##fileformat=VCFv4.1\n")?;
    if let Some(date) = file_date {
        writeln!(writer, "##fileDate={date}")?;
    }
    writer.write_all(META.as_bytes())?;
    writer.write_all(b"#CHROM\tPOS\tID\tREF\tALT\tQUAL\tFILTER\tINFO\tFORMAT")?;
    for sample in samples {
        write!(writer, "\t{sample}")?;
    }
    writer.write_all(b"\n")
}

/// Population statistics of one site, accumulated one sample at a time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SiteStats {
    /// Sum of all allele depths over called samples.
    pub depth: u64,
    /// Number of samples with a called genotype.
    pub called: usize,
    /// Per-allele depth sums, reference first.
    pub allele_depths: Vec<u64>,
    /// Per-allele counts over called genotypes (two per sample).
    pub allele_counts: Vec<u32>,
    /// Number of heterozygous calls.
    pub heterozygotes: usize,
}

impl SiteStats {
    /// Empty statistics for a site with `n_alleles` alleles (reference included).
    pub fn new(n_alleles: usize) -> Self {
        Self {
            depth: 0,
            called: 0,
            allele_depths: vec![0; n_alleles],
            allele_counts: vec![0; n_alleles],
            heterozygotes: 0,
        }
    }

    /// Fold in one sample's call; missing calls only count towards nothing.
    pub fn add(&mut self, call: &GenotypeCall) {
        let GenotypeCall::Called(call) = call else {
            return;
        };
        self.called += 1;
        for (idx, &depth) in call.depths.iter().enumerate() {
            self.depth += u64::from(depth);
            if let Some(slot) = self.allele_depths.get_mut(idx) {
                *slot += u64::from(depth);
            }
        }
        let (a, b) = call.alleles;
        for allele in [a, b] {
            if let Some(slot) = self.allele_counts.get_mut(allele) {
                *slot += 1;
            }
        }
        if a != b {
            self.heterozygotes += 1;
        }
    }

    /// Minor allele frequency from genotype allele counts: `min(f, 1 - f)` of the reference.
    pub fn minor_allele_frequency(&self) -> f32 {
        let total: u32 = self.allele_counts.iter().sum();
        if total == 0 {
            return 0.0;
        }
        let maf = (f64::from(self.allele_counts[0]) / f64::from(total)) as f32;
        if maf > 0.5 {
            1.0 - maf
        } else {
            maf
        }
    }

    /// `INFO` column for this site.
    pub fn info_field(&self, alternates: &[SiteAllele]) -> String {
        let join = |values: Vec<String>| values.join(",");
        format!(
            "DP={};NZ={};AD={};AC={};IL={};HT={};MAF={}",
            self.depth,
            self.called,
            join(self.allele_depths.iter().map(u64::to_string).collect()),
            join(self.allele_counts.iter().map(u32::to_string).collect()),
            join(alternates.iter().map(|a| a.indel_length.to_string()).collect()),
            self.heterozygotes,
            self.minor_allele_frequency()
        )
    }
}

/// One output row before the per-sample genotype columns.
#[derive(Debug, Clone, Copy)]
pub struct SiteRow<'a> {
    /// Chromosome id.
    pub chrom: u16,
    /// 1-based position.
    pub position: u32,
    /// Reference base.
    pub reference: u8,
    /// Alternate alleles.
    pub alternates: &'a [SiteAllele],
}

/// Write one data row.
pub fn write_row<W: Write, S: AsRef<str>>(
    writer: &mut W,
    row: SiteRow<'_>,
    stats: &SiteStats,
    genotypes: &[S],
) -> io::Result<()> {
    let alts: Vec<&str> = row.alternates.iter().map(|a| a.class.vcf_symbol()).collect();
    write!(
        writer,
        "{chrom}\t{pos}\t{chrom}-{pos}\t{reference}\t{alts}\t.\t.\t{info}\tGT:AD:GL",
        chrom = row.chrom,
        pos = row.position,
        reference = row.reference as char,
        alts = alts.join(","),
        info = stats.info_field(row.alternates),
    )?;
    for genotype in genotypes {
        write!(writer, "\t{}", genotype.as_ref())?;
    }
    writer.write_all(b"\n")
}
