use rand::{Rng, SeedableRng, rngs::StdRng};
use sparse_orchestra::{
    Range,
    spmm::{SpMat, times, trans_times},
};

/// A random sparse matrix in row compressed layout.
struct Csr<V> {
    offset: Vec<usize>,
    index: Vec<u32>,
    value: Vec<V>,
    cols: usize,
}

impl<V: Copy> Csr<V> {
    fn random(rng: &mut StdRng, rows: usize, cols: usize, mut gen_value: impl FnMut(&mut StdRng) -> V) -> Self {
        let mut csr = Self {
            offset: vec![0],
            index: Vec::new(),
            value: Vec::new(),
            cols,
        };

        for _ in 0..rows {
            for _ in 0..rng.random_range(0..6) {
                csr.index.push(rng.random_range(0..cols as u32));
                csr.value.push(gen_value(rng));
            }
            csr.offset.push(csr.index.len());
        }

        csr
    }

    fn view(&self) -> SpMat<'_, V> {
        SpMat::new(&self.offset, &self.index, Some(&self.value)).unwrap()
    }

    fn rows(&self) -> usize {
        self.offset.len() - 1
    }
}

#[test]
fn range_segments_partition_every_interval() {
    for (begin, end) in [(0, 0), (0, 1), (3, 10), (5, 105), (7, 8)] {
        let rg = Range::new(begin, end);
        for n in 1..12 {
            let segs: Vec<_> = (0..n).map(|i| rg.segment(i, n)).collect();

            assert_eq!(segs[0].begin, begin);
            assert_eq!(segs[n - 1].end, end);
            for w in segs.windows(2) {
                assert_eq!(w[0].end, w[1].begin);
                assert!(w[0].len() >= w[1].len() && w[0].len() - w[1].len() <= 1);
            }

            for idx in begin..end {
                assert_eq!(segs.iter().filter(|s| s.has(idx)).count(), 1);
            }
        }
    }
}

#[test]
fn integer_results_dont_depend_on_threads() {
    let mut rng = StdRng::seed_from_u64(42);

    for dim in [1, 3] {
        let csr = Csr::random(&mut rng, 57, 31, |rng| rng.random_range(-5i64..5));
        let d = csr.view();

        let x: Vec<i64> = (0..csr.cols * dim).map(|_| rng.random_range(-9..9)).collect();
        let xt: Vec<i64> = (0..csr.rows() * dim).map(|_| rng.random_range(-9..9)).collect();

        let mut y1 = vec![0; csr.rows() * dim];
        let mut yt1 = vec![0; csr.cols * dim];
        times(&d, &x, &mut y1, dim, 1).unwrap();
        trans_times(&d, &xt, 0, None, &mut yt1, dim, 1).unwrap();

        for threads in [2, 3, 8, 64] {
            let mut y = vec![0; csr.rows() * dim];
            let mut yt = vec![0; csr.cols * dim];
            times(&d, &x, &mut y, dim, threads).unwrap();
            trans_times(&d, &xt, 0, None, &mut yt, dim, threads).unwrap();

            assert_eq!(y, y1, "times with {threads} threads");
            assert_eq!(yt, yt1, "trans_times with {threads} threads");
        }
    }
}

#[test]
fn trans_times_matches_brute_force() {
    let mut rng = StdRng::seed_from_u64(7);
    let csr = Csr::random(&mut rng, 40, 25, |rng| rng.random_range(-1f64..1.));
    let d = csr.view();

    let x: Vec<f64> = (0..csr.rows()).map(|_| rng.random_range(-1.0..1.0)).collect();
    let z: Vec<f64> = (0..csr.cols).map(|_| rng.random_range(-1.0..1.0)).collect();
    let p = 0.25;

    let mut expected = vec![0.; csr.cols];
    for i in 0..csr.rows() {
        for j in csr.offset[i]..csr.offset[i + 1] {
            expected[csr.index[j] as usize] += csr.value[j] * x[i];
        }
    }

    let mut y = vec![0.; csr.cols];
    trans_times(&d, &x, 0., None, &mut y, 1, 4).unwrap();
    for (got, want) in y.iter().zip(&expected) {
        assert!((got - want).abs() < 1e-12);
    }

    // y starts from p * z
    let mut y = vec![0.; csr.cols];
    trans_times(&d, &x, p, Some(&z), &mut y, 1, 4).unwrap();
    for ((got, want), zi) in y.iter().zip(&expected).zip(&z) {
        assert!((got - (want + p * zi)).abs() < 1e-12);
    }
}

#[test]
fn real_results_agree_across_threads() {
    let mut rng = StdRng::seed_from_u64(3);
    let csr = Csr::random(&mut rng, 80, 50, |rng| rng.random_range(-1f32..1.));
    let d = csr.view();
    let x: Vec<f32> = (0..csr.cols).map(|_| rng.random_range(-1f32..1.)).collect();

    let mut single = vec![0.; csr.rows()];
    times(&d, &x, &mut single, 1, 1).unwrap();

    let mut multi = vec![0.; csr.rows()];
    times(&d, &x, &mut multi, 1, 6).unwrap();

    // rows are summed in the same order whatever the split
    assert_eq!(single, multi);
}
