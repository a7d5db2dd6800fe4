//! Two-locus (linkage disequilibrium) statistics.
//!
//! For every requested pair of sites, the joint distribution of
//! alleles over a sample set is summarized by the haplotype
//! counts `(w_AB, w_Ab, w_aB, w_ab)`; each statistic is a
//! function of those counts.  Allele membership bitsets are
//! computed once per site, with one subtree traversal per
//! mutation, and reused across every pairing.

use super::{sample_set_weights, StatMode, StatsError, StatsOptions, StatsResult};
use crate::newtypes::{NodeId, SiteId};
use crate::trees::TreeFlags;
use crate::treeseq::TreeSequence;

/// The supported two-locus summary statistics.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum TwoLocusStat {
    /// Covariance of allele presence, `D`.
    D,
    /// `D` squared.
    D2,
    /// `D` normalized by its maximum attainable value.
    DPrime,
    /// Correlation of allele presence.
    R,
    /// Squared correlation.
    R2,
    /// `D(1 - 2 p_A)(1 - 2 p_B)`.
    Dz,
    /// Joint heterozygosity `p_A(1-p_A) p_B(1-p_B)`.
    Pi2,
    /// Unbiased estimator of `D²`.
    D2Unbiased,
    /// Unbiased estimator of `Dz`.
    DzUnbiased,
    /// Unbiased estimator of `π₂`.
    Pi2Unbiased,
}

// A small dense bitset over sample indexes.
#[derive(Clone)]
struct SampleBitset {
    words: Vec<u64>,
}

impl SampleBitset {
    fn new(num_samples: usize) -> Self {
        Self {
            words: vec![0; (num_samples + 63) / 64],
        }
    }

    fn set(&mut self, i: usize) {
        self.words[i / 64] |= 1 << (i % 64);
    }

    fn count2(&self, other: &Self, mask: &Self) -> f64 {
        let mut n = 0u32;
        for ((a, b), m) in self
            .words
            .iter()
            .zip(other.words.iter())
            .zip(mask.words.iter())
        {
            n += (a & b & m).count_ones();
        }
        n as f64
    }

    fn count(&self, mask: &Self) -> f64 {
        let mut n = 0u32;
        for (a, m) in self.words.iter().zip(mask.words.iter()) {
            n += (a & m).count_ones();
        }
        n as f64
    }
}

// Derived-allele bitsets for one site.
struct SiteAlleles {
    alleles: Vec<SampleBitset>,
}

// Polynomials over the four haplotype frequencies, used to
// evaluate unbiased estimators via falling factorials.  Each
// term maps an exponent 4-tuple (total degree 4) to its
// coefficient.
type Poly = Vec<([u8; 4], f64)>;

fn poly_mul(a: &Poly, b: &Poly) -> Poly {
    let mut out: Poly = vec![];
    for (ea, ca) in a.iter() {
        for (eb, cb) in b.iter() {
            let e = [
                ea[0] + eb[0],
                ea[1] + eb[1],
                ea[2] + eb[2],
                ea[3] + eb[3],
            ];
            match out.iter_mut().find(|(x, _)| *x == e) {
                Some((_, c)) => *c += ca * cb,
                None => out.push((e, ca * cb)),
            }
        }
    }
    out.retain(|(_, c)| *c != 0.0);
    out
}

fn falling(x: f64, k: u8) -> f64 {
    let mut out = 1.0;
    for i in 0..k {
        out *= x - i as f64;
    }
    out
}

// Evaluate the unbiased estimator of a degree-4 homogeneous
// polynomial in the haplotype frequencies: each monomial
// w1^a w2^b w3^c w4^d is replaced by the ratio of falling
// factorials (n1)_a (n2)_b (n3)_c (n4)_d / (n)_4.
fn eval_unbiased(poly: &Poly, w: [f64; 4], n: f64) -> f64 {
    let denom = falling(n, 4);
    if denom <= 0.0 {
        return f64::NAN;
    }
    let mut total = 0.0;
    for (e, c) in poly.iter() {
        let mut term = *c;
        for (x, k) in w.iter().zip(e.iter()) {
            term *= falling(*x, *k);
        }
        total += term;
    }
    total / denom
}

// D expressed homogeneously: w_AB w_ab - w_Ab w_aB.
fn poly_d() -> Poly {
    vec![([1, 0, 0, 1], 1.0), ([0, 1, 1, 0], -1.0)]
}

fn unbiased_poly(stat: TwoLocusStat) -> Poly {
    let d = poly_d();
    match stat {
        TwoLocusStat::D2Unbiased => poly_mul(&d, &d),
        TwoLocusStat::DzUnbiased => {
            // (1 - 2 p_A) and (1 - 2 p_B), homogenized
            let one_minus_2pa: Poly = vec![
                ([0, 0, 1, 0], 1.0),
                ([0, 0, 0, 1], 1.0),
                ([1, 0, 0, 0], -1.0),
                ([0, 1, 0, 0], -1.0),
            ];
            let one_minus_2pb: Poly = vec![
                ([0, 1, 0, 0], 1.0),
                ([0, 0, 0, 1], 1.0),
                ([1, 0, 0, 0], -1.0),
                ([0, 0, 1, 0], -1.0),
            ];
            poly_mul(&poly_mul(&d, &one_minus_2pa), &one_minus_2pb)
        }
        TwoLocusStat::Pi2Unbiased => {
            let pa: Poly = vec![([1, 0, 0, 0], 1.0), ([0, 1, 0, 0], 1.0)];
            let qa: Poly = vec![([0, 0, 1, 0], 1.0), ([0, 0, 0, 1], 1.0)];
            let pb: Poly = vec![([1, 0, 0, 0], 1.0), ([0, 0, 1, 0], 1.0)];
            let qb: Poly = vec![([0, 1, 0, 0], 1.0), ([0, 0, 0, 1], 1.0)];
            poly_mul(&poly_mul(&pa, &qa), &poly_mul(&pb, &qb))
        }
        _ => unreachable!(),
    }
}

fn biased_stat(stat: TwoLocusStat, w: [f64; 4], n: f64) -> f64 {
    let p_ab = w[0] / n;
    let p_a = (w[0] + w[1]) / n;
    let p_b = (w[0] + w[2]) / n;
    let d = p_ab - p_a * p_b;
    match stat {
        TwoLocusStat::D => d,
        TwoLocusStat::D2 => d * d,
        TwoLocusStat::DPrime => {
            let d_max = if d >= 0.0 {
                (p_a * (1.0 - p_b)).min((1.0 - p_a) * p_b)
            } else {
                (p_a * p_b).min((1.0 - p_a) * (1.0 - p_b))
            };
            if d_max > 0.0 {
                d / d_max
            } else {
                0.0
            }
        }
        TwoLocusStat::R => {
            let denom = p_a * (1.0 - p_a) * p_b * (1.0 - p_b);
            if denom > 0.0 {
                d / denom.sqrt()
            } else {
                0.0
            }
        }
        TwoLocusStat::R2 => {
            let denom = p_a * (1.0 - p_a) * p_b * (1.0 - p_b);
            if denom > 0.0 {
                d * d / denom
            } else {
                0.0
            }
        }
        TwoLocusStat::Dz => d * (1.0 - 2.0 * p_a) * (1.0 - 2.0 * p_b),
        TwoLocusStat::Pi2 => p_a * (1.0 - p_a) * p_b * (1.0 - p_b),
        _ => unreachable!(),
    }
}

fn is_unbiased(stat: TwoLocusStat) -> bool {
    matches!(
        stat,
        TwoLocusStat::D2Unbiased | TwoLocusStat::DzUnbiased | TwoLocusStat::Pi2Unbiased
    )
}

// Resolve, for every requested site, the bitset of samples
// carrying each derived allele.  One sweep over the trees;
// one subtree traversal per mutation.
fn site_allele_bitsets(
    ts: &TreeSequence,
    wanted: &[SiteId],
) -> StatsResult<Vec<SiteAlleles>> {
    let num_samples = ts.num_samples();
    let mut out: Vec<Option<SiteAlleles>> = (0..wanted.len()).map(|_| None).collect();
    // map site id -> output slot
    let mut slot = vec![usize::MAX; ts.tables_ref().sites().len()];
    for (i, s) in wanted.iter().enumerate() {
        if s.0 < 0 || (s.0 as usize) >= slot.len() {
            return Err(StatsError::SiteOutOfBounds);
        }
        slot[s.0 as usize] = i;
    }

    let mut tree = ts.tree_iterator(TreeFlags::SAMPLE_LISTS)?;
    // per-sample current allele index into the site's allele
    // vector; rebuilt for each site
    let mut allele_of = vec![0usize; num_samples];
    while tree.next_tree() {
        let tree_index = tree.index().unwrap();
        for s in ts.tree_site_range(tree_index) {
            if slot[s] == usize::MAX {
                continue;
            }
            let site = &ts.tables_ref().sites()[s];
            // allele 0 is the ancestral state
            let mut states: Vec<Option<Vec<u8>>> = vec![site.ancestral_state.clone()];
            for a in allele_of.iter_mut() {
                *a = 0;
            }
            for m in ts.site_mutation_range(s) {
                let mutation = &ts.tables_ref().mutations()[m];
                let derived = mutation.derived_state.clone();
                let allele = match states.iter().position(|x| *x == derived) {
                    Some(i) => i,
                    None => {
                        states.push(derived);
                        states.len() - 1
                    }
                };
                // mutations are ordered parent-before-child, so
                // overwriting resolves stacked mutations
                for u in tree.samples(mutation.node)? {
                    allele_of[ts.sample_index(u).unwrap()] = allele;
                }
            }
            let mut alleles: Vec<SampleBitset> =
                (0..states.len()).map(|_| SampleBitset::new(num_samples)).collect();
            for (j, a) in allele_of.iter().enumerate() {
                alleles[*a].set(j);
            }
            out[slot[s]] = Some(SiteAlleles { alleles });
        }
    }
    Ok(out
        .into_iter()
        .map(|x| x.unwrap_or(SiteAlleles { alleles: vec![] }))
        .collect())
}

/// Compute a matrix of two-locus statistics over pairs of
/// sites.
///
/// # Parameters
///
/// * `stat`: which statistic to evaluate.
/// * `sample_sets`: the sample sets; one result dimension each.
/// * `rows`/`cols`: site ids for the matrix rows and columns,
///   or `None` for all sites.
/// * `options`: only [`StatMode::Site`] is supported for
///   two-locus statistics; `polarised` is implied (ancestral
///   alleles never count as haplotype members).
///
/// # Returns
///
/// A flat vector in `[row][col][sample_set]` layout.  At sites
/// with several derived alleles, the statistic is averaged over
/// derived-allele pairs.
pub fn ld_matrix(
    ts: &TreeSequence,
    stat: TwoLocusStat,
    sample_sets: &[&[NodeId]],
    rows: Option<&[SiteId]>,
    cols: Option<&[SiteId]>,
    options: &StatsOptions,
) -> StatsResult<Vec<f64>> {
    if options.mode != StatMode::Site {
        return Err(StatsError::UnsupportedStatMode);
    }
    let sets = sample_set_weights(ts, sample_sets)?;
    let num_sets = sets.num_sets;
    let num_samples = ts.num_samples();

    let all_sites: Vec<SiteId> = (0..ts.tables_ref().sites().len())
        .map(SiteId::from)
        .collect();
    let rows: Vec<SiteId> = rows.map(|r| r.to_vec()).unwrap_or_else(|| all_sites.clone());
    let cols: Vec<SiteId> = cols.map(|c| c.to_vec()).unwrap_or(all_sites);

    // bitsets for the union of requested sites
    let mut wanted: Vec<SiteId> = rows.iter().chain(cols.iter()).copied().collect();
    wanted.sort();
    wanted.dedup();
    let bitsets = site_allele_bitsets(ts, &wanted)?;
    let lookup = |s: SiteId| -> &SiteAlleles {
        &bitsets[wanted.binary_search(&s).unwrap()]
    };

    // per-set masks
    let mut masks: Vec<SampleBitset> = (0..num_sets)
        .map(|_| SampleBitset::new(num_samples))
        .collect();
    for (k, set) in sample_sets.iter().enumerate() {
        for u in set.iter() {
            masks[k].set(ts.sample_index(*u).unwrap());
        }
    }

    let poly = if is_unbiased(stat) {
        Some(unbiased_poly(stat))
    } else {
        None
    };

    let mut result = vec![0.0; rows.len() * cols.len() * num_sets];
    for (ri, r) in rows.iter().enumerate() {
        let site_a = lookup(*r);
        for (ci, c) in cols.iter().enumerate() {
            let site_b = lookup(*c);
            for k in 0..num_sets {
                let n = sets.sizes[k];
                let mask = &masks[k];
                let mut total = 0.0;
                let mut num_pairs = 0.0;
                for a in site_a.alleles.iter().skip(1) {
                    let w_a = a.count(mask);
                    for b in site_b.alleles.iter().skip(1) {
                        let w_b = b.count(mask);
                        let w_ab = a.count2(b, mask);
                        let w = [w_ab, w_a - w_ab, w_b - w_ab, n - w_a - w_b + w_ab];
                        total += match &poly {
                            Some(p) => eval_unbiased(p, w, n),
                            None => biased_stat(stat, w, n),
                        };
                        num_pairs += 1.0;
                    }
                }
                result[(ri * cols.len() + ci) * num_sets + k] = if num_pairs > 0.0 {
                    total / num_pairs
                } else {
                    0.0
                };
            }
        }
    }
    Ok(result)
}
