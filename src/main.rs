use anyhow::{anyhow, bail, Error};
use clap::Parser;
use ftail::Ftail;
use log::{debug, info, LevelFilter};

use phylo_beagle::coalescent::{
    coalescent_log_likelihood, ExponentialGrowth, IntervalList, TreeIntervals,
};
use phylo_beagle::io::{read_alignment, read_newick_from_file};
use phylo_beagle::likelihood::TreeLikelihoodBuilder;
use phylo_beagle::substitution_models::{DNAModelType, DNASubstModel};

mod cli;
use crate::cli::Cli;

type Result<T> = std::result::Result<T, Error>;

fn main() -> Result<()> {
    Ftail::new()
        .console(LevelFilter::Info)
        .init()
        .map_err(|e| anyhow!("Unable to set up logging: {}", e))?;

    let cli = match Cli::try_parse() {
        Ok(cli) => {
            info!("Successfully parsed the command line parameters");
            cli
        }
        Err(error) => {
            bail!("Unable to parse command line arguments: \n {}", error)
        }
    };
    debug!("{:?}", cli);

    info!("Running on sequences from {}.", cli.seq_file.display());
    let patterns = read_alignment(&cli.seq_file)?;

    info!("Using tree from {}.", cli.tree_file.display());
    let Some(tree) = read_newick_from_file(&cli.tree_file)?.into_iter().next() else {
        bail!("No trees found in {}", cli.tree_file.display());
    };

    let mut model =
        DNASubstModel::new(DNAModelType::get_model_type(&cli.model), &cli.model_params)?;
    if !cli.freqs.is_empty() {
        model = model.with_frequencies(&cli.freqs)?;
    }
    let site_model = cli.site_model()?;
    info!("Site model: {}", site_model);

    let mut builder =
        TreeLikelihoodBuilder::new(tree.clone(), patterns, model).site_model(site_model);
    if cli.general_kernels {
        builder = builder.general_kernels();
    }
    let mut likelihood = builder.build()?;
    let logl = likelihood.log_likelihood()?;
    println!("Tree log-likelihood: {}", logl);
    if cli.site_log_likelihoods {
        for (site, site_logl) in likelihood.site_log_likelihoods()?.iter().enumerate() {
            println!("{}\t{}", site + 1, site_logl);
        }
    }

    if let Some(pop_size) = cli.pop_size {
        let population = ExponentialGrowth::new(pop_size, cli.growth_rate)?;
        let intervals = TreeIntervals::new(&tree);
        info!(
            "Tree has {} intervals over {} samples, total duration {}.",
            intervals.interval_count(),
            intervals.sample_count(),
            intervals.total_duration()
        );
        let coalescent_logl = coalescent_log_likelihood(&intervals, &population, 0.0);
        println!("Coalescent log-likelihood: {}", coalescent_logl);
    }

    info!("Run done.");
    Ok(())
}
