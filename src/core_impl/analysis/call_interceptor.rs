/// Monotonic count of function boundary crossings for one run.
#[derive(Debug, Default)]
pub(crate) struct CallInterceptor {
    count: u64,
}

impl CallInterceptor {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Records one crossing and returns how many crossings preceded it.
    pub(crate) fn enter(&mut self) -> u64 {
        let preceding = self.count;
        self.count += 1;
        preceding
    }

    pub(crate) fn count(&self) -> u64 {
        self.count
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn enter_reports_preceding_crossings() {
        let mut calls = CallInterceptor::new();
        assert_eq!(calls.enter(), 0);
        assert_eq!(calls.enter(), 1);
        assert_eq!(calls.count(), 2);
    }
}
