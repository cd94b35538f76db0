/// Coefficients of an embedded Runge-Kutta pair.
///
/// `a` is the stage matrix, `low` the weights of the estimate that is carried
/// from step to step and `high` the weights of the companion estimate used only
/// to measure the local error. The time offsets `c` are the row sums of `a`.
///
/// A tableau is implicit when any entry on or above the diagonal of `a` is
/// nonzero. Only diagonally implicit tableaus can be integrated: the
/// strictly upper part of `a` must stay zero.
///
/// `order` is the order used by the step controller. For the Fehlberg and
/// Dormand-Prince pairs below the carried weights are the fifth order
/// combination while `order` is 4, so the pair is run in local extrapolation
/// mode.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ButcherTableau<const STAGES: usize> {
    a: [[f64; STAGES]; STAGES],
    low: [f64; STAGES],
    high: [f64; STAGES],
    c: [f64; STAGES],
    order: u32,
    implicit: bool,
}

impl<const STAGES: usize> ButcherTableau<STAGES> {
    /// Builds a tableau, deriving the time offsets and the implicit flag.
    ///
    /// # Panics
    ///
    /// Panics (at compile time for constants) if the tableau has no stage, if
    /// `order` is zero or if the first stage does not start at the beginning of
    /// the step.
    pub const fn new(
        a: [[f64; STAGES]; STAGES],
        low: [f64; STAGES],
        high: [f64; STAGES],
        order: u32,
    ) -> Self {
        assert!(STAGES > 0, "a tableau needs at least one stage");
        assert!(order > 0, "order must be at least 1");

        let mut c = [0.0; STAGES];
        let mut implicit = false;
        let mut i = 0;
        while i < STAGES {
            let mut j = 0;
            while j < STAGES {
                c[i] += a[i][j];
                if j >= i && a[i][j] != 0.0 {
                    implicit = true;
                }
                j += 1;
            }
            i += 1;
        }
        assert!(c[0] == 0.0, "first stage must sit at the start of the step");

        Self {
            a,
            low,
            high,
            c,
            order,
            implicit,
        }
    }

    pub fn a(&self) -> &[[f64; STAGES]; STAGES] {
        &self.a
    }

    pub fn low(&self) -> &[f64; STAGES] {
        &self.low
    }

    pub fn high(&self) -> &[f64; STAGES] {
        &self.high
    }

    pub fn c(&self) -> &[f64; STAGES] {
        &self.c
    }

    pub fn order(&self) -> u32 {
        self.order
    }

    pub const fn stages(&self) -> usize {
        STAGES
    }

    pub fn is_implicit(&self) -> bool {
        self.implicit
    }
}

impl ButcherTableau<2> {
    // usage is ButcherTableau::<2>::RK12
    /// Euler with a Heun error estimate.
    pub const RK12: Self = Self::new(
        [[0., 0.], [1., 0.]],
        [1., 0.],
        [1. / 2., 1. / 2.],
        1,
    );

    /// Backward Euler with a trapezoidal error estimate.
    pub const ESDIRK12: Self = Self::new(
        [[0., 0.], [0., 1.]],
        [0., 1.],
        [1. / 2., 1. / 2.],
        1,
    );
}

impl ButcherTableau<3> {
    /// Fehlberg's first order pair.
    pub const RKF12: Self = Self::new(
        [
            [0., 0., 0.],
            [1. / 2., 0., 0.],
            [1. / 256., 255. / 256., 0.],
        ],
        [1. / 256., 255. / 256., 0.],
        [1. / 512., 255. / 256., 1. / 512.],
        1,
    );
}

const ESDIRK34_GAMMA: f64 = 0.43586652150845899942;

impl ButcherTableau<4> {
    /// Bogacki-Shampine 3(2), carrying the second order weights and measuring
    /// the error against the third order ones.
    pub const RK23: Self = Self::new(
        [
            [0., 0., 0., 0.],
            [1. / 2., 0., 0., 0.],
            [0., 3. / 4., 0., 0.],
            [2. / 9., 1. / 3., 4. / 9., 0.],
        ],
        [7. / 24., 1. / 4., 1. / 3., 1. / 8.],
        [2. / 9., 1. / 3., 4. / 9., 0.],
        2,
    );

    /// Stiffly accurate L-stable third order ESDIRK with an embedded companion.
    pub const ESDIRK34: Self = Self::new(
        [
            [0., 0., 0., 0.],
            [ESDIRK34_GAMMA, ESDIRK34_GAMMA, 0., 0.],
            [
                0.14073777472470619619,
                -0.1083655513813208000,
                ESDIRK34_GAMMA,
                0.,
            ],
            [
                0.10239940061991099768,
                -0.3768784522555561061,
                0.83861253012718610911,
                ESDIRK34_GAMMA,
            ],
        ],
        [
            0.10239940061991099768,
            -0.3768784522555561061,
            0.83861253012718610911,
            ESDIRK34_GAMMA,
        ],
        [
            0.15702489786032493710,
            0.11733044137043884870,
            0.61667803039212146434,
            0.10896663037711474985,
        ],
        3,
    );
}

impl ButcherTableau<6> {
    // usage is ButcherTableau::<6>::RK45
    /// Runge-Kutta-Fehlberg 4(5).
    pub const RK45: Self = Self::new(
        [
            [0., 0., 0., 0., 0., 0.],
            [1. / 4., 0., 0., 0., 0., 0.],
            [3. / 32., 9. / 32., 0., 0., 0., 0.],
            [1932. / 2197., -7200. / 2197., 7296. / 2197., 0., 0., 0.],
            [439. / 216., -8., 3680. / 513., -845. / 4104., 0., 0.],
            [
                -8. / 27.,
                2.,
                -3544. / 2565.,
                1859. / 4104.,
                -11. / 40.,
                0.,
            ],
        ],
        [
            16. / 135.,
            0.,
            6656. / 12825.,
            28561. / 56430.,
            -9. / 50.,
            2. / 55.,
        ],
        [25. / 216., 0., 1408. / 2565., 2197. / 4104., -1. / 5., 0.],
        4,
    );
}

impl ButcherTableau<7> {
    // usage is ButcherTableau::<7>::DORMAND_PRINCE45
    /// Dormand-Prince 5(4). The carried weights are the fifth order ones, equal
    /// to the last stage row, and `order` is that of the fourth order
    /// companion, the same layout as `RK45`.
    pub const DORMAND_PRINCE45: Self = Self::new(
        [
            [0., 0., 0., 0., 0., 0., 0.],
            [1. / 5., 0., 0., 0., 0., 0., 0.],
            [3. / 40., 9. / 40., 0., 0., 0., 0., 0.],
            [44. / 45., -56. / 15., 32. / 9., 0., 0., 0., 0.],
            [
                19372. / 6561.,
                -25360. / 2187.,
                64448. / 6561.,
                -212. / 729.,
                0.,
                0.,
                0.,
            ],
            [
                9017. / 3168.,
                -355. / 33.,
                46732. / 5247.,
                49. / 176.,
                -5103. / 18656.,
                0.,
                0.,
            ],
            [
                35. / 384.,
                0.,
                500. / 1113.,
                125. / 192.,
                -2187. / 6784.,
                11. / 84.,
                0.,
            ],
        ],
        [
            35. / 384.,
            0.,
            500. / 1113.,
            125. / 192.,
            -2187. / 6784.,
            11. / 84.,
            0.,
        ],
        [
            5179. / 57600.,
            0.,
            7571. / 16695.,
            393. / 640.,
            -92097. / 339200.,
            187. / 2100.,
            1. / 40.,
        ],
        4,
    );
}
