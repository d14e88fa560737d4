use burn::backend::NdArray;
use burn::backend::ndarray::NdArrayDevice;
use drivenets::core::squeezenet::DISCRETE_BINS;
use drivenets::core::{AnyNet, DrivingOutput, DrivingSample, InferenceEngine, NetConfig, NetKind, Prediction};

type B = NdArray;

#[test]
fn every_kind_runs_a_forward_pass() {
    let device = NdArrayDevice::default();

    for kind in NetKind::ALL {
        let config = NetConfig::new(kind, 2, 3).unwrap();
        let net = AnyNet::<B>::init(&config, &device);
        let output = net.forward(net.sample_input(2, &device)).unwrap();

        match output {
            DrivingOutput::Trajectory(trajectory) => {
                assert_ne!(kind, NetKind::SqueezeNet);
                assert_eq!(trajectory.dims(), [2, 3, 2], "{}", kind);
            }
            DrivingOutput::Discrete { steering, controls } => {
                assert_eq!(kind, NetKind::SqueezeNet);
                assert_eq!(steering.dims(), [2, DISCRETE_BINS]);
                assert_eq!(controls.dims(), [2, DISCRETE_BINS]);
            }
        }
    }
}

#[test]
fn parameter_count_grows_with_frames() {
    let device = NdArrayDevice::default();

    for kind in NetKind::ALL {
        let one = AnyNet::<B>::init(&NetConfig::new(kind, 1, 5).unwrap(), &device);
        let four = AnyNet::<B>::init(&NetConfig::new(kind, 4, 5).unwrap(), &device);
        assert!(four.num_params() > one.num_params(), "{}", kind);
    }
}

#[test]
fn engine_predicts_from_saved_config() {
    let device = NdArrayDevice::default();
    let path = std::env::temp_dir().join(format!(
        "drivenets_engine_{}.json",
        std::process::id()
    ));
    let path = path.to_str().unwrap();

    NetConfig::new(NetKind::Feedforward, 1, 20)
        .unwrap()
        .save(path)
        .unwrap();
    let engine = InferenceEngine::<B>::load(path, &device).unwrap();
    std::fs::remove_file(path).ok();

    assert_eq!(engine.config().kind, NetKind::Feedforward);

    let prediction = engine.predict(DrivingSample::zeros(1)).unwrap();
    match prediction {
        Prediction::Trajectory(steps) => assert_eq!(steps.len(), 20),
        Prediction::Discrete { .. } => panic!("feedforward predicts a trajectory"),
    }
}

#[test]
fn engine_load_reports_missing_file() {
    let device = NdArrayDevice::default();
    let result = InferenceEngine::<B>::load("/nonexistent/drivenets.json", &device);
    let error = result.err().expect("loading a missing file should fail");
    assert!(format!("{:#}", error).contains("/nonexistent/drivenets.json"));
}
