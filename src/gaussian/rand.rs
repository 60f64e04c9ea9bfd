use rand::{
    prelude::Distribution,
    rngs::StdRng,
    Rng,
    SeedableRng,
};

use crate::gaussian::data::{
    Splat,
    SplatData,
};


impl Distribution<Splat> for rand::distributions::Standard {
    fn sample<R: Rng + ?Sized>(&self, rng: &mut R) -> Splat {
        let rotation: [f32; 4] = [
            rng.gen_range(-1.0..1.0),
            rng.gen_range(-1.0..1.0),
            rng.gen_range(-1.0..1.0),
            rng.gen_range(-1.0..1.0),
        ];
        let norm = rotation.iter().map(|r| r * r).sum::<f32>().sqrt().max(1e-6);

        Splat {
            position: [
                rng.gen_range(-5.0..5.0),
                rng.gen_range(-5.0..5.0),
                rng.gen_range(-5.0..5.0),
            ],
            color: [
                rng.gen_range(0.0..1.0),
                rng.gen_range(0.0..1.0),
                rng.gen_range(0.0..1.0),
                rng.gen_range(0.2..1.0),
            ],
            rotation: rotation.map(|r| r / norm),
            scale: [
                rng.gen_range(0.02..0.2),
                rng.gen_range(0.02..0.2),
                rng.gen_range(0.02..0.2),
            ],
        }
    }
}


pub fn random_splats(n: usize) -> SplatData {
    let mut rng = rand::thread_rng();
    let splats: Vec<Splat> = (0..n).map(|_| rng.r#gen()).collect();

    SplatData::from_splats(&splats)
}

pub fn random_splats_seeded(n: usize, seed: u64) -> SplatData {
    let mut rng = StdRng::seed_from_u64(seed);
    let splats: Vec<Splat> = (0..n).map(|_| rng.r#gen()).collect();

    SplatData::from_splats(&splats)
}
