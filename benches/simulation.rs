use criterion::*;
use aosim::{
    Builder, DeformableMirror, FromBuilder, ImageData, ShackHartmann, Simulator, TipTilt,
    Wavefront, WavefrontCorrector, ActuationMode, CorrectorKind,
};

fn screen(width: usize, height: usize) -> ImageData {
    let samples = (0..height)
        .flat_map(|i| (0..width).map(move |j| (i as f64, j as f64)))
        .map(|(y, x)| (128. + 60. * ((x * 0.05).sin() * (y * 0.03).cos())) as u8)
        .collect();
    ImageData::new(samples, width, height).unwrap()
}

pub fn shackhartmann_benchmark(c: &mut Criterion) {
    let mut group = c.benchmark_group("shackhartmann");
    for n_lenslet in [4usize, 8, 16] {
        let mut wfs = ShackHartmann::builder()
            .resolution(256, 256)
            .regular_grid(n_lenslet, n_lenslet)
            .build()
            .unwrap();
        let mut wf = Wavefront::new(256, 256);
        let mut tt = TipTilt::new();
        tt.actuate(&[0.1, -0.05], ActuationMode::Set, &mut wf);
        group.bench_with_input(
            BenchmarkId::new("Imaging", n_lenslet),
            &n_lenslet,
            |b, _| b.iter(|| black_box(wfs.process(&wf).len())),
        );
    }
    group.finish();
}

pub fn deformable_mirror_benchmark(c: &mut Criterion) {
    let mut group = c.benchmark_group("deformable_mirror");
    group.sample_size(10);
    for resolution in [64usize, 128, 256] {
        let mut dm = DeformableMirror::builder()
            .resolution(resolution, resolution)
            .actuator_grid(8, 8)
            .build()
            .unwrap();
        let commands: Vec<f32> = (0..64).map(|i| ((i % 7) as f32 - 3.) / 3.).collect();
        group.bench_with_input(
            BenchmarkId::new("Cold solve", resolution),
            &resolution,
            |b, _| {
                b.iter(|| {
                    dm.reset();
                    black_box(dm.solve(&commands))
                })
            },
        );
        group.bench_with_input(
            BenchmarkId::new("Warm solve", resolution),
            &resolution,
            |b, _| b.iter(|| black_box(dm.solve(&commands))),
        );
    }
    group.finish();
}

pub fn pipeline_benchmark(c: &mut Criterion) {
    let mut sim = Simulator::builder()
        .resolution(128, 128)
        .phase_screen(screen(512, 512))
        .corrector(CorrectorKind::DeformableMirror(Default::default()))
        .circular_aperture(0.9)
        .build()
        .unwrap();
    c.bench_function("Frame pipeline", |b| {
        b.iter(|| black_box(sim.capture().unwrap().stats))
    });
}

criterion_group!(
    benches,
    shackhartmann_benchmark,
    deformable_mirror_benchmark,
    pipeline_benchmark
);
criterion_main!(benches);
