use std::f64::consts::PI;

use malus::Error;
use malus::core::frame::{Frame, Vec3, rotate_frame_at_branch};
use malus::core::fset::{FSet, parse_functions};
use malus::core::physics::{DEFAULT_MODULUS_OF_RUPTURE, rupture, second_moment_of_area_circle};
use malus::core::random::SimRng;
use malus::sim::calendar::ActiveEvents;
use malus::sim::structure::OrganTemplates;
use malus::tree::fruit::{ExpolinearGrowth, Fruit, FruitModelConfig, FruitState};
use malus::tree::markov::{LengthClass, Markov, MarkovLibrary};
use malus::tree::metamer::Metamer;

fn assert_rows_sum_to_one(rows: &[Vec<f64>], label: &str) {
    for (i, row) in rows.iter().enumerate() {
        let total: f64 = row.iter().sum();
        assert!((total - 1.0).abs() < 1e-9, "{label} row {i} sums to {total}");
    }
}

#[test]
fn bounded_sequences_respect_bounds() {
    let library = MarkovLibrary::builtin().unwrap();
    let mut markov = Markov::new(4, 70, 1000).unwrap();
    let mut rng = SimRng::new(2024);
    for year_no in 0..5 {
        markov.select_year(&library, year_no).unwrap();
        for _ in 0..50 {
            let medium = markov
                .generate_bounded_medium_sequence(&mut rng, 5, 15)
                .unwrap();
            assert!((5..=15).contains(&medium.len()), "medium length {}", medium.len());
            let long = markov
                .generate_bounded_long_sequence(&mut rng, 15, 26)
                .unwrap();
            assert!((15..=26).contains(&long.len()), "long length {}", long.len());
        }
    }
}

#[test]
fn builtin_models_are_normalized() {
    let library = MarkovLibrary::builtin().unwrap();
    for (class, year) in [
        (LengthClass::Medium, 3),
        (LengthClass::Medium, 5),
        (LengthClass::Long, 1),
        (LengthClass::Long, 3),
        (LengthClass::Long, 5),
    ] {
        let model = library.get(class, year).unwrap();
        let label = format!("{class} {year}");
        let initial: f64 = model.initial_probabilities().iter().sum();
        assert!((initial - 1.0).abs() < 1e-9, "{label} initial sums to {initial}");
        assert_rows_sum_to_one(model.transition_probabilities(), &label);
        assert_rows_sum_to_one(model.observation_distributions(), &label);
        let last = model.transition_probabilities().last().unwrap();
        let n = last.len();
        assert_eq!(last[n - 1], 1.0, "{label} last state is not absorbing");
    }
}

fn three_state_model(length: &str, last_row: &str) -> String {
    format!(
        r#"
[[model]]
year = 1
length = "{length}"
initial_probabilities = [1.0, 0.0, 0.0]
transition_probabilities = [[0.0, 1.0, 0.0], [0.0, 0.0, 1.0], {last_row}]
occupancy_distributions = [
    {{ distribution = "POISSON", parameter = 2.0, bounds = [1, 6] }},
    {{ distribution = "POISSON", parameter = 2.0, bounds = [1, 6] }},
]
observation_distributions = [[1.0, 0.0], [0.0, 1.0], [1.0, 0.0]]
"#
    )
}

#[test]
fn model_file_with_open_last_state_is_rejected() {
    let medium = three_state_model("MEDIUM", "[0.0, 0.0, 1.0]");
    let open = medium.clone() + &three_state_model("LONG", "[0.5, 0.5, 0.0]");
    assert!(matches!(
        MarkovLibrary::from_toml_str(&open),
        Err(Error::InvalidModel(_))
    ));
    let closed = medium + &three_state_model("LONG", "[0.0, 0.0, 3.0]");
    assert!(MarkovLibrary::from_toml_str(&closed).is_ok());
}

#[test]
fn function_table_with_absurd_point_count_is_a_parse_error() {
    let text = "fver 1 1\nfuncs 1\nfname leaf_area\nsamples 2\nflip off\npoints 18446744073709551615\n0 0\n1 1\n";
    assert!(matches!(parse_functions(text), Err(Error::Parse { .. })));
}

#[test]
fn draw_index_stays_in_range() {
    let mut rng = SimRng::new(5);
    for _ in 0..2000 {
        let i = rng.draw_index(&[0.25, 0.25, 0.25, 0.25]).unwrap();
        assert!((1..=4).contains(&i));
    }
    assert!(matches!(
        rng.draw_index(&[1.0, 1.0, 1.0, 1.0]),
        Err(Error::InvalidArgument(_))
    ));
}

#[test]
fn zero_angles_keep_the_frame() {
    let frame = Frame::new(Vec3::new(1.0, 0.0, 0.0), Vec3::new(0.0, 1.0, 0.0)).unwrap();
    let rotated = rotate_frame_at_branch(&frame, 0.0, 0.0);
    assert!((rotated.heading - frame.heading).norm() < 1e-12);
    assert!((rotated.up - frame.up).norm() < 1e-12);
    assert!((rotated.left - frame.left).norm() < 1e-12);
}

#[test]
fn circle_moment_and_rupture_threshold() {
    assert_eq!(second_moment_of_area_circle(1.0), PI / 4.0);
    assert!(!rupture(&Vec3::new(0.0, 0.0, 5e6), 1.0, DEFAULT_MODULUS_OF_RUPTURE));
    assert!(rupture(&Vec3::new(0.0, 0.0, 5e7), 1.0, DEFAULT_MODULUS_OF_RUPTURE));
}

#[test]
fn apple_mass_follows_expolinear_law() {
    let mut fruit = Fruit::new(FruitModelConfig::default().create_model());
    let mut last = 0.0;
    for day in 11..=160 {
        fruit.age = day as f64;
        let mass = fruit.compute_mass();
        assert!(mass >= last);
        last = mass;
    }
    fruit.age = 50.0;
    let expected = (0.0018 / 0.167) * (1.0f64 + (0.167f64 * (50.0 - 10.0 - 28.0)).exp()).ln();
    assert!((fruit.compute_mass() - expected).abs() < 1e-12);
}

#[test]
fn staked_trunk_ignores_torque() {
    let mut metamer = Metamer::new(OrganTemplates::default().organs(), Frame::vertical(), 1, false);
    metamer.trunk = true;
    metamer.rigidity = 1.0;
    metamer.cumulated_torque = Vec3::new(3.0, -2.0, 0.5);
    metamer
        .calculate_rotation_velocity(&ActiveEvents::default(), true, 0.5)
        .unwrap();
    assert_eq!(metamer.rotation_velocity, Vec3::zeros());
}

#[test]
fn certain_fruit_set_counts_one_fruit() {
    let templates = OrganTemplates {
        fruit: FruitModelConfig::Expolinear(ExpolinearGrowth {
            probability: 1.0,
            ..ExpolinearGrowth::default()
        }),
        ..OrganTemplates::default()
    };
    let mut metamer = Metamer::new(templates.organs(), Frame::vertical(), 1, true);
    assert_eq!(metamer.fruit.state(), FruitState::Flower);
    metamer.age = 11.0;
    let mut rng = SimRng::new(1);
    let set = metamer
        .organ_activity(&ActiveEvents::default(), &mut rng, &FSet::leaf_area_default())
        .unwrap();
    assert_eq!(set, 1);
    assert_eq!(metamer.fruit.state(), FruitState::Fruit);
}
