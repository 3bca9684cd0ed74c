use approx::assert_relative_eq;
use linexec::{Buffer, Computation, ComputationDesc, EngineError, Executor, Matrix, Vector};
use linexec_backend_cpu::CpuExecutor;
use linexec_backend_gpu::GpuExecutor;
use rand::rngs::StdRng;
use rand::SeedableRng;

const VECTORS: [(&str, usize); 6] = [
    ("x", 24),
    ("h", 16),
    ("bias", 16),
    ("out", 16),
    ("y", 24),
    ("z", 24),
];

fn populate<B: Buffer>(buffer: &mut B, seed: u64) {
    let mut rng = StdRng::seed_from_u64(seed);
    let mut w = Matrix::randn(16, 24, 0.5, &mut rng);
    buffer.insert("W", &mut w).expect("insert W");
    for (name, len) in VECTORS {
        let mut v = Vector::randn(len, 1.0, &mut rng);
        buffer.insert(name, &mut v).expect("insert vector");
    }
}

fn run<E: Executor>(executor: &E, desc: &ComputationDesc, iterations: usize) -> Vec<Vec<f32>> {
    let mut buffer = executor.create_buffer();
    populate(&mut buffer, 2024);
    let computation = executor.compile(&buffer, desc).expect("compile");
    executor
        .execute(&mut buffer, &computation, iterations)
        .expect("execute");
    let mut contents = vec![buffer.view::<Matrix>("W").expect("W").to_vec()];
    for (name, _) in VECTORS {
        contents.push(buffer.view::<Vector>(name).expect("vector").to_vec());
    }
    contents
}

fn assert_backends_agree(commands: &[&str], iterations: usize) {
    let _ = env_logger::builder().is_test(true).try_init();
    let desc: ComputationDesc = commands.iter().copied().collect();
    let cpu = run(&CpuExecutor::new(), &desc, iterations);
    for local_size in [1, 4, 64] {
        let gpu = run(
            &GpuExecutor::host().with_local_size(local_size),
            &desc,
            iterations,
        );
        for (cpu_item, gpu_item) in cpu.iter().zip(&gpu) {
            assert_eq!(cpu_item.len(), gpu_item.len());
            for (a, b) in cpu_item.iter().zip(gpu_item) {
                assert_relative_eq!(*a, *b, epsilon = 1e-4, max_relative = 1e-4);
            }
        }
    }
}

#[test]
fn single_layer_agrees() {
    assert_backends_agree(&["h = multiply W x", "out = add h bias"], 1);
}

#[test]
fn mixed_work_sizes_agree_over_iterations() {
    assert_backends_agree(
        &[
            "y = multiply x 0.5",
            "z = add y x",
            "h = multiply W z",
            "out = add h bias",
            "out = multiply out 0.25",
            "x = multiply z 0.9",
        ],
        3,
    );
}

#[test]
fn fused_groups_follow_work_size_runs() {
    let desc: ComputationDesc = [
        "y = multiply x 0.5",
        "z = add y x",
        "h = multiply W z",
        "out = add h bias",
        "x = multiply z 0.9",
    ]
    .into_iter()
    .collect();

    let gpu = GpuExecutor::host();
    let mut buffer = gpu.create_buffer();
    populate(&mut buffer, 1);
    let computation = gpu.compile(&buffer, &desc).expect("compile");
    assert_eq!(
        computation.step_commands(),
        vec![
            vec!["y = multiply x 0.5", "z = add y x"],
            vec!["h = multiply W z", "out = add h bias"],
            vec!["x = multiply z 0.9"],
        ]
    );

    let cpu = CpuExecutor::new();
    let mut cpu_buffer = cpu.create_buffer();
    populate(&mut cpu_buffer, 1);
    assert_eq!(
        cpu.compile(&cpu_buffer, &desc).expect("compile").step_count(),
        5
    );
}

#[test]
fn uniform_work_size_is_one_dispatch() {
    let desc = ComputationDesc::parse("y = multiply x 2\nz = add y x\nx = add z y");
    let gpu = GpuExecutor::host();
    let mut buffer = gpu.create_buffer();
    populate(&mut buffer, 5);
    let computation = gpu.compile(&buffer, &desc).expect("compile");
    assert_eq!(computation.step_count(), 1);
}

fn permutation_buffer<E: Executor>(executor: &E) -> E::Buffer {
    let mut buffer = executor.create_buffer();
    let mut m = Matrix::from_rows(&[[0.0, 1.0, 0.0], [1.0, 0.0, 0.0], [0.0, 0.0, 1.0]])
        .expect("matrix");
    let mut v = Vector::from_vec(vec![3.0, 4.0, 5.0]);
    let mut a = Vector::zeros(3);
    buffer.insert("M", &mut m).expect("insert M");
    buffer.insert("V", &mut v).expect("insert V");
    buffer.insert("A", &mut a).expect("insert A");
    buffer
}

fn permuted<E: Executor>(executor: &E, commands: &str) -> (Vec<f32>, Vec<f32>) {
    let mut buffer = permutation_buffer(executor);
    let computation = executor
        .compile(&buffer, &ComputationDesc::parse(commands))
        .expect("compile");
    executor
        .execute(&mut buffer, &computation, 1)
        .expect("execute");
    (
        buffer.view::<Vector>("A").expect("A").to_vec(),
        buffer.view::<Vector>("V").expect("V").to_vec(),
    )
}

#[test]
fn product_input_written_later_in_group_agrees() {
    let commands = "A = multiply M V\nV = multiply V 2";
    let cpu = permuted(&CpuExecutor::new(), commands);
    assert_eq!(cpu, (vec![4.0, 3.0, 5.0], vec![6.0, 8.0, 10.0]));
    for local_size in [1, 2, 64] {
        let gpu = GpuExecutor::host().with_local_size(local_size);
        assert_eq!(permuted(&gpu, commands), cpu);
        let buffer = permutation_buffer(&gpu);
        let computation = gpu
            .compile(&buffer, &ComputationDesc::parse(commands))
            .expect("compile");
        assert_eq!(computation.step_count(), 2);
    }
}

#[test]
fn product_input_written_earlier_in_group_agrees() {
    let commands = "V = multiply V 2\nA = multiply M V";
    let cpu = permuted(&CpuExecutor::new(), commands);
    assert_eq!(cpu, (vec![8.0, 6.0, 10.0], vec![6.0, 8.0, 10.0]));
    for local_size in [1, 2, 64] {
        let gpu = GpuExecutor::host().with_local_size(local_size);
        assert_eq!(permuted(&gpu, commands), cpu);
    }
}

#[test]
fn in_place_product_is_rejected_by_gpu() {
    let cpu = CpuExecutor::new();
    assert_eq!(permuted(&cpu, "V = multiply M V").1, vec![4.0, 3.0, 5.0]);

    let gpu = GpuExecutor::host();
    let buffer = permutation_buffer(&gpu);
    let err = gpu
        .compile(&buffer, &ComputationDesc::parse("A = add A V\nV = multiply M V"))
        .expect_err("in-place product");
    assert!(matches!(err, EngineError::UnsupportedOperation { .. }));
}
