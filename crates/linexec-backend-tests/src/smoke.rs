use approx::assert_abs_diff_eq;
use linexec::{
    Array3, Buffer, Computation, ComputationDesc, EngineError, Executor, Matrix, Vector,
};
use rand::rngs::StdRng;
use rand::SeedableRng;

pub fn init_logger() {
    let _ = env_logger::builder().is_test(true).try_init();
}

fn desc(commands: &[&str]) -> ComputationDesc {
    commands.iter().copied().collect()
}

fn scenario_matrix() -> Matrix {
    Matrix::from_rows(&[
        [1.0, 2.0, 3.0, 4.0],
        [5.0, 6.0, 7.0, 8.0],
        [9.0, 0.0, 1.0, 2.0],
    ])
    .expect("scenario matrix")
}

/// Buffer holding `M` (3x4), `V` (4), `B` (3) and zeroed `A`, `C` (3).
fn scenario_buffer<E: Executor>(executor: &E) -> E::Buffer {
    let mut buffer = executor.create_buffer();
    let mut m = scenario_matrix();
    let mut v = Vector::from_vec(vec![7.0, 2.0, 4.0, 3.0]);
    let mut b = Vector::from_vec(vec![4.0, 3.0, 2.0]);
    let mut a = Vector::zeros(3);
    let mut c = Vector::zeros(3);
    buffer.insert("M", &mut m).expect("insert M");
    buffer.insert("V", &mut v).expect("insert V");
    buffer.insert("B", &mut b).expect("insert B");
    buffer.insert("A", &mut a).expect("insert A");
    buffer.insert("C", &mut c).expect("insert C");
    buffer
}

fn vector<B: Buffer>(buffer: &B, name: &str) -> Vec<f32> {
    buffer
        .view::<Vector>(name)
        .unwrap_or_else(|err| panic!("view {name}: {err}"))
        .to_vec()
}

fn run<E: Executor>(executor: &E, buffer: &mut E::Buffer, commands: &[&str], iterations: usize) {
    let computation = executor
        .compile(buffer, &desc(commands))
        .unwrap_or_else(|err| panic!("{} compile failed: {err}", executor.backend_name()));
    executor
        .execute(buffer, &computation, iterations)
        .unwrap_or_else(|err| panic!("{} execute failed: {err}", executor.backend_name()));
}

fn assert_close(actual: &[f32], expected: &[f32]) {
    assert_eq!(actual.len(), expected.len(), "length mismatch");
    for (a, e) in actual.iter().zip(expected) {
        assert_abs_diff_eq!(*a, *e, epsilon = 1e-4);
    }
}

pub fn buffer_roundtrip_preserves_items<E: Executor>(executor: &E) {
    let mut rng = StdRng::seed_from_u64(3);
    let mut buffer = executor.create_buffer();
    let mut v = Vector::randn(5, 1.0, &mut rng);
    let mut m = Matrix::randn(2, 3, 1.0, &mut rng);
    let mut t = Array3::randn(2, 2, 3, 1.0, &mut rng);
    let (v_copy, m_copy, t_copy) = (v.clone(), m.clone(), t.clone());

    assert_eq!(buffer.storage_size(), 0);
    buffer.insert("v", &mut v).expect("insert v");
    buffer.insert("m", &mut m).expect("insert m");
    buffer.insert("t", &mut t).expect("insert t");
    assert!(v.is_view() && m.is_view() && t.is_view());
    assert!(buffer.storage_size() >= 4 * (5 + 6 + 12));
    assert_eq!(buffer.directory().len(), 3);

    assert_eq!(buffer.view::<Vector>("v").expect("view v"), v_copy);
    assert_eq!(buffer.view::<Matrix>("m").expect("view m"), m_copy);
    assert_eq!(buffer.view::<Array3>("t").expect("view t"), t_copy);
    assert_eq!(buffer.view::<Array3>("t").expect("view t").shape(), [2, 2, 3]);
}

pub fn view_with_wrong_kind_is_rejected<E: Executor>(executor: &E) {
    let buffer = scenario_buffer(executor);
    assert!(matches!(
        buffer.view::<Matrix>("V"),
        Err(EngineError::KindMismatch { .. })
    ));
    assert!(matches!(
        buffer.view::<Vector>("nope"),
        Err(EngineError::UnknownBinding(name)) if name == "nope"
    ));
}

pub fn duplicate_insert_is_rejected<E: Executor>(executor: &E) {
    let mut buffer = scenario_buffer(executor);
    let size = buffer.storage_size();
    let mut replacement = Vector::zeros(3);
    let err = buffer
        .insert("A", &mut replacement)
        .expect_err("duplicate insert must fail");
    assert_eq!(err, EngineError::DuplicateBinding("A".into()));
    assert_eq!(buffer.storage_size(), size);
    assert_eq!(buffer.directory().len(), 5);
}

pub fn matrix_vector_scenario_matches_expected<E: Executor>(executor: &E) {
    let mut buffer = scenario_buffer(executor);
    run(executor, &mut buffer, &["A = multiply M V", "C = add A B"], 1);
    assert_close(&vector(&buffer, "A"), &[35.0, 99.0, 73.0]);
    assert_close(&vector(&buffer, "C"), &[39.0, 102.0, 75.0]);
    assert_close(&vector(&buffer, "V"), &[7.0, 2.0, 4.0, 3.0]);
}

pub fn results_are_visible_through_inserted_handles<E: Executor>(executor: &E) {
    let mut buffer = executor.create_buffer();
    let mut x = Vector::from_vec(vec![1.0, -2.0, 3.0]);
    let mut y = Vector::zeros(3);
    buffer.insert("x", &mut x).expect("insert x");
    buffer.insert("y", &mut y).expect("insert y");
    run(executor, &mut buffer, &["y = multiply x -0.5"], 1);
    assert_close(&y.to_vec(), &[-0.5, 1.0, -1.5]);
}

pub fn chained_descriptions_match_sequential_runs<E: Executor>(executor: &E) {
    let first = ["A = multiply M V", "C = add A B"];
    let second = ["C = multiply C 2.0", "A = add C B"];

    let mut sequential = scenario_buffer(executor);
    run(executor, &mut sequential, &first, 1);
    run(executor, &mut sequential, &second, 1);

    let mut chained = scenario_buffer(executor);
    let mut combined = desc(&first);
    combined.chain(&desc(&second));
    assert_eq!(combined.len(), 4);
    let computation = executor.compile(&chained, &combined).expect("compile chain");
    executor
        .execute(&mut chained, &computation, 1)
        .expect("execute chain");

    assert_close(&vector(&chained, "C"), &[78.0, 204.0, 150.0]);
    assert_close(&vector(&chained, "A"), &[82.0, 207.0, 152.0]);
    for name in ["A", "B", "C", "V"] {
        assert_close(&vector(&chained, name), &vector(&sequential, name));
    }
}

pub fn iterations_repeat_every_step<E: Executor>(executor: &E) {
    let mut buffer = executor.create_buffer();
    let mut c = Vector::from_vec(vec![1.0, 2.0, 3.0]);
    let mut d = Vector::from_vec(vec![1.0, 1.0, 1.0]);
    buffer.insert("C", &mut c).expect("insert C");
    buffer.insert("D", &mut d).expect("insert D");
    run(
        executor,
        &mut buffer,
        &["C = multiply C 2.0", "D = add D D"],
        3,
    );
    assert_close(&c.to_vec(), &[8.0, 16.0, 24.0]);
    assert_close(&d.to_vec(), &[8.0, 8.0, 8.0]);
}

pub fn zero_iterations_leave_buffer_untouched<E: Executor>(executor: &E) {
    let mut buffer = scenario_buffer(executor);
    run(executor, &mut buffer, &["A = multiply M V", "C = add A B"], 0);
    assert_close(&vector(&buffer, "A"), &[0.0; 3]);
    assert_close(&vector(&buffer, "C"), &[0.0; 3]);
}

pub fn aliased_operands_read_before_write<E: Executor>(executor: &E) {
    let mut buffer = executor.create_buffer();
    let mut a = Vector::from_vec(vec![1.5, -1.0]);
    buffer.insert("A", &mut a).expect("insert A");
    run(executor, &mut buffer, &["A = add A A"], 2);
    assert_close(&a.to_vec(), &[6.0, -4.0]);
}

pub fn random_matvec_matches_host_product<E: Executor>(executor: &E) {
    let mut rng = StdRng::seed_from_u64(42);
    let (rows, cols) = (37, 19);
    let m = Matrix::randn(rows, cols, 1.0, &mut rng);
    let v = Vector::randn(cols, 1.0, &mut rng);
    let expected = (&m * &v).to_vec();

    let mut buffer = executor.create_buffer();
    let (mut m_stored, mut v_stored) = (m.clone(), v.clone());
    let mut out = Vector::zeros(rows);
    buffer.insert("M", &mut m_stored).expect("insert M");
    buffer.insert("V", &mut v_stored).expect("insert V");
    buffer.insert("out", &mut out).expect("insert out");
    run(executor, &mut buffer, &["out = multiply M V"], 1);
    assert_close(&out.to_vec(), &expected);
}

pub fn shape_mismatch_is_rejected<E: Executor>(executor: &E) {
    let mut buffer = scenario_buffer(executor);
    let mut short = Vector::zeros(3);
    buffer.insert("S", &mut short).expect("insert S");
    for command in ["A = multiply M S", "A = add A V", "V = multiply M V"] {
        let result = executor.compile(&buffer, &desc(&[command]));
        assert!(
            matches!(result, Err(EngineError::ShapeMismatch { .. })),
            "{command:?} should fail with a shape mismatch"
        );
    }
}

pub fn unknown_bindings_are_rejected<E: Executor>(executor: &E) {
    let buffer = scenario_buffer(executor);
    let result = executor.compile(&buffer, &desc(&["X = add A B"]));
    assert!(matches!(result, Err(EngineError::UnknownBinding(name)) if name == "X"));
    let result = executor.compile(&buffer, &desc(&["A = multiply M Q"]));
    assert!(matches!(result, Err(EngineError::UnknownBinding(name)) if name == "Q"));
}

pub fn unsupported_signatures_are_rejected<E: Executor>(executor: &E) {
    let buffer = scenario_buffer(executor);
    for command in ["A = multiply 1.0 2.0", "A = divide A B", "A = add A 1"] {
        let result = executor.compile(&buffer, &desc(&[command]));
        assert!(
            matches!(result, Err(EngineError::UnsupportedOperation { .. })),
            "{command:?} should be unsupported"
        );
    }
    let result = executor.compile(&buffer, &desc(&["A multiply M V"]));
    assert!(matches!(result, Err(EngineError::Syntax { .. })));
}

pub fn computation_runs_on_identical_layout<E: Executor>(executor: &E) {
    let compiled_on = scenario_buffer(executor);
    let computation = executor
        .compile(&compiled_on, &desc(&["A = multiply M V", "C = add A B"]))
        .expect("compile");
    assert!(computation.step_count() >= 1);
    assert_eq!(computation.layout().len(), 5);

    let mut twin = scenario_buffer(executor);
    executor
        .execute(&mut twin, &computation, 1)
        .expect("identical layout");
    assert_close(&vector(&twin, "C"), &[39.0, 102.0, 75.0]);
    assert_close(&vector(&compiled_on, "C"), &[0.0; 3]);
}

pub fn incompatible_buffer_is_rejected<E: Executor>(executor: &E) {
    let compiled_on = scenario_buffer(executor);
    let computation = executor
        .compile(&compiled_on, &desc(&["C = add A B"]))
        .expect("compile");

    let mut other = executor.create_buffer();
    let mut b = Vector::from_vec(vec![1.0, 1.0, 1.0]);
    let mut a = Vector::from_vec(vec![2.0, 2.0, 2.0]);
    let mut c = Vector::zeros(3);
    other.insert("B", &mut b).expect("insert B");
    other.insert("A", &mut a).expect("insert A");
    other.insert("C", &mut c).expect("insert C");

    let err = executor
        .execute(&mut other, &computation, 1)
        .expect_err("layout differs");
    assert!(matches!(err, EngineError::IncompatibleBuffer(_)));
    assert_close(&c.to_vec(), &[0.0; 3]);
}
