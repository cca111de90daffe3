use std::path::PathBuf;

use clap::Parser;

use phylo_beagle::likelihood::SiteModel;

type Result<T> = std::result::Result<T, anyhow::Error>;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub(super) struct Cli {
    /// Aligned sequence file in fasta format
    #[arg(short, long, value_name = "SEQ_FILE")]
    pub(super) seq_file: PathBuf,

    /// Rooted tree file in newick format, only the first tree is used
    #[arg(short, long, value_name = "TREE_FILE")]
    pub(super) tree_file: PathBuf,

    /// Nucleotide substitution model: JC69, K80, HKY or GTR
    #[arg(short, long, value_name = "MODEL", default_value = "JC69")]
    pub(super) model: String,

    /// Model parameters, e.g. kappa for K80 or frequencies and kappa for HKY
    #[arg(short = 'p', long, value_name = "MODEL_PARAMS", num_args = 1..)]
    pub(super) model_params: Vec<f64>,

    /// Stationary frequencies in ACGT order, overriding those of the model
    #[arg(short, long, value_name = "FREQS", num_args = 4)]
    pub(super) freqs: Vec<f64>,

    /// Explicit rate category multipliers
    #[arg(long, value_name = "RATES", num_args = 1..)]
    pub(super) category_rates: Vec<f64>,

    /// Weights of the explicit rate categories, equal if not given
    #[arg(long, value_name = "WEIGHTS", num_args = 1..)]
    pub(super) category_weights: Vec<f64>,

    /// Shape of the discrete gamma rate heterogeneity
    #[arg(short = 'a', long, value_name = "SHAPE")]
    pub(super) gamma_shape: Option<f64>,

    /// Number of discrete gamma categories
    #[arg(long, default_value_t = 4)]
    pub(super) gamma_categories: usize,

    /// Proportion of invariable sites
    #[arg(short = 'i', long, default_value_t = 0.0)]
    pub(super) prop_invariant: f64,

    /// Present-day effective population size for the coalescent log-likelihood
    #[arg(short = 'n', long, value_name = "POP_SIZE")]
    pub(super) pop_size: Option<f64>,

    /// Exponential growth rate of the population
    #[arg(short = 'r', long, default_value_t = 0.0)]
    pub(super) growth_rate: f64,

    /// Print the log-likelihood of every alignment column
    #[arg(long)]
    pub(super) site_log_likelihoods: bool,

    /// Use the general kernels for nucleotide data
    #[arg(long)]
    pub(super) general_kernels: bool,
}

impl Cli {
    pub(super) fn site_model(&self) -> Result<SiteModel> {
        if let Some(shape) = self.gamma_shape {
            if !self.category_rates.is_empty() {
                anyhow::bail!("Explicit rate categories cannot be combined with gamma rates");
            }
            return SiteModel::gamma(shape, self.gamma_categories, self.prop_invariant);
        }
        if self.category_rates.is_empty() {
            return SiteModel::invariant(self.prop_invariant);
        }
        if self.prop_invariant > 0.0 {
            anyhow::bail!("Explicit rate categories cannot be combined with invariable sites");
        }
        if self.category_weights.is_empty() {
            SiteModel::new(
                &self.category_rates,
                &vec![1.0; self.category_rates.len()],
            )
        } else {
            SiteModel::new(&self.category_rates, &self.category_weights)
        }
    }
}

#[cfg(test)]
mod tests {
    use clap::Parser;

    use super::Cli;

    #[test]
    fn parses_model_and_categories() {
        let cli = Cli::try_parse_from([
            "phylo-beagle",
            "-s",
            "seqs.fasta",
            "-t",
            "tree.newick",
            "-m",
            "HKY",
            "-p",
            "0.1",
            "0.2",
            "0.3",
            "0.4",
            "2.0",
            "--category-rates",
            "0.5",
            "1.5",
        ])
        .unwrap();
        assert_eq!(cli.model, "HKY");
        assert_eq!(cli.model_params, vec![0.1, 0.2, 0.3, 0.4, 2.0]);
        let site_model = cli.site_model().unwrap();
        assert_eq!(site_model.weights(), &[0.5, 0.5]);
        assert_eq!(cli.pop_size, None);
    }

    #[test]
    fn defaults_to_a_single_rate() {
        let cli =
            Cli::try_parse_from(["phylo-beagle", "-s", "a.fasta", "-t", "a.newick"]).unwrap();
        assert_eq!(cli.model, "JC69");
        assert!(cli.freqs.is_empty());
        assert_eq!(cli.site_model().unwrap().rates(), &[1.0]);
    }

    #[test]
    fn gamma_and_explicit_rates_conflict() {
        let cli = Cli::try_parse_from([
            "phylo-beagle",
            "-s",
            "a.fasta",
            "-t",
            "a.newick",
            "-a",
            "0.5",
            "--category-rates",
            "1.0",
        ])
        .unwrap();
        assert!(cli.site_model().is_err());
    }

    #[test]
    fn missing_files_are_rejected() {
        assert!(Cli::try_parse_from(["phylo-beagle", "-s", "a.fasta"]).is_err());
    }
}
