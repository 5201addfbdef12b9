/// A four sample moving average on an operator's feedback path.
///
/// The feeding operator registers its output with [FeedbackFilter::input]
/// each sample, and the algorithm calls [FeedbackFilter::step] once per
/// sample before any operator runs, so the filtered output always lags the
/// feeding operator by one sample.
#[derive(Clone, Debug, Default)]
pub struct FeedbackFilter {
    input: i32,
    output: i32,
    buf: [i32; 4],
    ptr: usize,
    acc: i64,
}

impl FeedbackFilter {
    /// Constructor
    pub fn new() -> Self {
        Self::default()
    }
    /// Register the newest sample
    pub fn input(&mut self, sample: i32) {
        self.input = sample;
    }
    /// The filtered output, as of the last [FeedbackFilter::step]
    pub fn output(&self) -> i32 {
        self.output
    }
    /// Take in the registered sample and recompute the output.  `scale` is
    /// the feedback amount, 0-127, where 127 is about half gain.
    pub fn step(&mut self, scale: i32) -> i32 {
        self.acc += i64::from(self.input) - i64::from(self.buf[self.ptr]);
        self.buf[self.ptr] = self.input;
        self.ptr = (self.ptr + 1) & 3;
        // scale by half at full, plus the /4 of the average
        self.output = ((self.acc * i64::from(scale.clamp(0, 127))) >> 10) as i32;
        self.output
    }
    /// Clear the history
    pub fn reset(&mut self) {
        *self = Self::default();
    }
}
