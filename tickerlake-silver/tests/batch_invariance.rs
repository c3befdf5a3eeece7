mod common;

use common::*;
use proptest::prelude::*;
use tickerlake_core::data::MemoryLake;
use tickerlake_silver::PipelineConfig;

proptest! {
    #![proptest_config(ProptestConfig::with_cases(24))]

    /// Any pair of batch sizes produces the same Silver tables.
    #[test]
    fn batch_sizes_are_invisible(
        ticker_count in 1usize..8,
        aggregation in 1usize..5,
        indicators in 1usize..5,
    ) {
        let tickers = universe(ticker_count);
        let days = trading_days(d(2023, 1, 2), 45);

        let batched = MemoryLake::new();
        seed_lake(&batched, &tickers, &days);
        let report = run(
            &batched,
            PipelineConfig::default().with_batch_sizes(Some(aggregation), Some(indicators)),
        );
        prop_assert!(report.committed);

        let single = MemoryLake::new();
        seed_lake(&single, &tickers, &days);
        run_default(&single);

        prop_assert_eq!(snapshot(&batched), snapshot(&single));
    }

    /// Splitting history across two runs at any point matches one run.
    #[test]
    fn any_split_point_matches_full_run(cut in 1usize..59) {
        let tickers = universe(2);
        let days = trading_days(d(2023, 1, 2), 60);

        let incremental = MemoryLake::new();
        for (seed, ticker) in tickers.iter().enumerate() {
            incremental.insert_raw_bars(synthetic_bars(ticker, seed, &days)[..cut].to_vec());
        }
        run_default(&incremental);
        for (seed, ticker) in tickers.iter().enumerate() {
            incremental.insert_raw_bars(synthetic_bars(ticker, seed, &days)[cut..].to_vec());
        }
        run_default(&incremental);

        let full = MemoryLake::new();
        seed_lake(&full, &tickers, &days);
        run_default(&full);

        prop_assert_eq!(snapshot(&incremental), snapshot(&full));
    }
}
