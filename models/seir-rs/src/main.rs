use std::path::PathBuf;

use anyhow::Context;
use clap::Parser;
use mrp::Environment;
use rand::{SeedableRng, rngs::StdRng};
use serde::Deserialize;
use tracing_subscriber::EnvFilter;

use seir::{
    CompartmentTimeSeries, CompartmentalModel, CompartmentalParameters, ContactNetwork, EbcmModel,
    EpidemicOutput, MeanFieldModel, NetworkParameters, StochasticNetworkModel,
    StochasticParameters,
};

#[derive(Debug, Parser)]
#[command(name = "seir")]
#[command(about = "Run one SEIR simulation described by a run description")]
struct Args {
    /// JSON or TOML run description; stdin when omitted
    path: Option<PathBuf>,
}

#[derive(Debug, Deserialize)]
struct SeirInput {
    #[serde(flatten)]
    model: ModelInput,
    #[serde(default)]
    compute_rt: bool,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "model", rename_all = "snake_case")]
enum ModelInput {
    Compartmental(CompartmentalParameters),
    Ebcm {
        #[serde(flatten)]
        parameters: NetworkParameters,
        network: NetworkInput,
    },
    Meanfield {
        #[serde(flatten)]
        parameters: NetworkParameters,
        /// Defaults to one node's share of the network.
        rho: Option<f64>,
        network: NetworkInput,
    },
    Stochastic {
        #[serde(flatten)]
        parameters: StochasticParameters,
        network: NetworkInput,
        initial_infecteds: Option<Vec<usize>>,
        #[serde(default)]
        initial_recovereds: Vec<usize>,
    },
}

#[derive(Debug, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
enum NetworkInput {
    EdgeList { file: String },
    RingLattice { nodes: usize, degree: usize },
    ErdosRenyi { nodes: usize, p: f64 },
    Complete { nodes: usize },
}

#[derive(Debug, Deserialize)]
struct EdgeRow {
    source: usize,
    target: usize,
}

fn build_network(
    env: &Environment<SeirInput>,
    source: &NetworkInput,
) -> anyhow::Result<ContactNetwork> {
    let network = match source {
        NetworkInput::EdgeList { file } => {
            let rows: Vec<EdgeRow> = env.read_csv(file)?;
            ContactNetwork::from_edges(0, rows.into_iter().map(|row| (row.source, row.target)))?
        }
        NetworkInput::RingLattice { nodes, degree } => {
            ContactNetwork::ring_lattice(*nodes, *degree)?
        }
        NetworkInput::ErdosRenyi { nodes, p } => {
            let mut rng = StdRng::seed_from_u64(env.seed);
            ContactNetwork::erdos_renyi(*nodes, *p, &mut rng)?
        }
        NetworkInput::Complete { nodes } => ContactNetwork::complete(*nodes),
    };
    tracing::info!(
        nodes = network.order(),
        edges = network.size(),
        "built contact network"
    );
    Ok(network)
}

fn run(env: &Environment<SeirInput>, model: &ModelInput) -> anyhow::Result<CompartmentTimeSeries> {
    let series = match model {
        ModelInput::Compartmental(parameters) => CompartmentalModel::simulate(parameters)?,
        ModelInput::Ebcm {
            parameters,
            network,
        } => EbcmModel::new(&build_network(env, network)?).simulate(parameters)?,
        ModelInput::Meanfield {
            parameters,
            rho,
            network,
        } => {
            let model = MeanFieldModel::new(&build_network(env, network)?);
            let parameters = NetworkParameters {
                rho: rho.unwrap_or_else(|| model.default_rho()),
                ..parameters.clone()
            };
            model.simulate(&parameters)?
        }
        ModelInput::Stochastic {
            parameters,
            network,
            initial_infecteds,
            initial_recovereds,
        } => {
            let network = build_network(env, network)?;
            let model = StochasticNetworkModel::new(&network);
            let parameters = StochasticParameters {
                seed: env.seed,
                ..parameters.clone()
            };
            match initial_infecteds {
                Some(infecteds) => {
                    model.simulate_with(&parameters, infecteds, initial_recovereds)?
                }
                None => model.simulate(&parameters)?,
            }
        }
    };
    Ok(series)
}

fn write_outputs(
    env: &Environment<SeirInput>,
    series: &CompartmentTimeSeries,
    output: &EpidemicOutput,
) -> anyhow::Result<()> {
    let mut headers = vec!["t", "S", "E", "I", "R", "daily_incidence"];
    if output.rt.is_some() {
        headers.push("rt");
    }
    let rows: Vec<Vec<String>> = (0..series.len())
        .map(|i| {
            let mut row = vec![
                series.t[i].to_string(),
                series.s[i].to_string(),
                series.e[i].to_string(),
                series.i[i].to_string(),
                series.r[i].to_string(),
                output.daily_incidence[i].to_string(),
            ];
            if let Some(rt) = &output.rt {
                row.push(rt[i].to_string());
            }
            row
        })
        .collect();
    env.write_csv("seir_output.csv", &headers, &rows)?;

    let weekly: Vec<Vec<String>> = output
        .weekly_incidence
        .iter()
        .enumerate()
        .map(|(week, incidence)| vec![week.to_string(), incidence.to_string()])
        .collect();
    env.write_csv("seir_weekly.csv", &["week", "incidence"], &weekly)?;
    env.write_manifest()?;
    Ok(())
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("seir=info,mrp=info")),
        )
        .init();

    let args = Args::parse();
    let env = match args.path {
        Some(path) => Environment::from_path(&path)
            .with_context(|| format!("reading run description {}", path.display()))?
            .with_input_type::<SeirInput>()?,
        None => Environment::<SeirInput>::load()?,
    };
    let input = env
        .input
        .as_ref()
        .context("run description has no typed input")?;

    let series = run(&env, &input.model)?;
    let output = EpidemicOutput::from_series(&series, input.compute_rt)?;
    if let Some((day, height)) = series.peak() {
        tracing::info!(
            days = series.len(),
            peak_day = day,
            peak_infectious = height,
            final_recovered = series.r.last().copied().unwrap_or_default(),
            "simulation finished"
        );
    }
    write_outputs(&env, &series, &output)
}

#[cfg(test)]
mod test {
    use super::*;
    use serde_json::json;

    fn parse(input: serde_json::Value) -> Environment<SeirInput> {
        Environment::from_json(json!({ "input": input }))
            .with_input_type::<SeirInput>()
            .unwrap()
    }

    #[test]
    fn test_args() {
        use clap::CommandFactory;
        Args::command().debug_assert();
        let args = Args::try_parse_from(["seir", "runs/outbreak.toml"]).unwrap();
        assert_eq!(args.path, Some(PathBuf::from("runs/outbreak.toml")));
        assert_eq!(Args::try_parse_from(["seir"]).unwrap().path, None);
        assert!(Args::try_parse_from(["seir", "a.json", "b.json"]).is_err());
    }

    #[test]
    fn test_compartmental_defaults() {
        let env = parse(json!({ "model": "compartmental", "beta": 0.3 }));
        let input = env.input.as_ref().unwrap();
        assert!(!input.compute_rt);
        let ModelInput::Compartmental(parameters) = &input.model else {
            panic!("expected compartmental input");
        };
        assert_eq!(parameters.beta, 0.3);
        assert_eq!(parameters.tmax, 150);
        assert_eq!(parameters.population, 1e6);
    }

    #[test]
    fn test_meanfield_rho_is_optional() {
        let env = parse(json!({
            "model": "meanfield",
            "tmax": 60,
            "network": { "kind": "ring_lattice", "nodes": 100, "degree": 4 },
        }));
        let input = env.input.as_ref().unwrap();
        let ModelInput::Meanfield { parameters, rho, .. } = &input.model else {
            panic!("expected mean-field input");
        };
        assert_eq!(*rho, None);
        assert_eq!(parameters.tmax, 60);
        let series = run(&env, &input.model).unwrap();
        assert_eq!(series.len(), 60);
        assert!((series.i[0] - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_stochastic_uses_run_seed() {
        let input = json!({
            "model": "stochastic",
            "seed": 17,
            "rho": 0.05,
            "tmax": 30,
            "network": { "kind": "erdos_renyi", "nodes": 200, "p": 0.03 },
        });
        let first = parse(input.clone());
        let second = parse(input);
        let model = &first.input.as_ref().unwrap().model;
        assert_eq!(first.seed, 17);
        assert_eq!(run(&first, model).unwrap(), run(&second, model).unwrap());
    }

    #[test]
    fn test_unknown_model_is_rejected() {
        let result = Environment::from_json(json!({ "input": { "model": "agent_based" } }))
            .with_input_type::<SeirInput>();
        assert!(matches!(result, Err(mrp::MrpError::Input(_))));
    }

    #[test]
    fn test_edge_list_needs_named_file() {
        let env = parse(json!({
            "model": "ebcm",
            "network": { "kind": "edge_list", "file": "contacts" },
        }));
        let input = env.input.as_ref().unwrap();
        assert!(run(&env, &input.model).is_err());
    }

    #[test]
    fn test_outputs_written_with_rt() {
        let dir = tempfile::tempdir().unwrap();
        let env = Environment::from_json(json!({
            "input": { "model": "compartmental", "tmax": 20, "compute_rt": true },
            "output": { "spec": "filesystem", "dir": dir.path() },
        }))
        .with_input_type::<SeirInput>()
        .unwrap();
        let input = env.input.as_ref().unwrap();
        let series = run(&env, &input.model).unwrap();
        let output = EpidemicOutput::from_series(&series, input.compute_rt).unwrap();
        write_outputs(&env, &series, &output).unwrap();

        let daily = std::fs::read_to_string(dir.path().join("seir_output.csv")).unwrap();
        assert!(daily.starts_with("t,S,E,I,R,daily_incidence,rt\n"));
        assert_eq!(daily.lines().count(), 21);
        let weekly = std::fs::read_to_string(dir.path().join("seir_weekly.csv")).unwrap();
        assert_eq!(weekly.lines().count(), 4);
        assert!(dir.path().join(mrp::MANIFEST_FILENAME).exists());
    }
}
