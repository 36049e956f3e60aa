use kiosk_core::{query, FacetName, FilterState, Item, Offering, Package};
use kiosk_search::{filter_items_with_debug, Vocabulary};
use std::time::Instant;

const CATEGORIES: [&str; 6] = ["Database", "Analytics", "Networking", "Security", "Monitoring", ""];

fn gen_item(i: usize) -> Item {
    let name = format!("app-{i:06}");
    if i % 10 == 0 {
        Item::Offering(Offering {
            display_name: name.clone(),
            name,
            categories: Offering::parse_categories(&format!("{}, {}", CATEGORIES[i % 5], CATEGORIES[(i + 1) % 5])),
            provider: format!("vendor{}, Inc.", i % 7),
            ..Default::default()
        })
    } else {
        Item::Package(Package {
            display_name: name.clone(),
            name,
            categories: smallvec::smallvec![CATEGORIES[i % CATEGORIES.len()].to_string()],
            repository: format!("repo{}", i % 12),
            ..Default::default()
        })
    }
}

fn percentile_us(xs: &mut [u128], p: f64) -> u128 {
    xs.sort_unstable();
    let idx = ((xs.len() as f64 - 1.0) * p).round() as usize;
    xs[idx]
}

fn main() {
    let n: usize = std::env::var("KIOSK_BENCH_ITEMS")
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(100_000);

    eprintln!("generating catalog: {} items", n);
    let items: Vec<Item> = (0..n).map(gen_item).collect();

    let t0 = Instant::now();
    let vocab = Vocabulary::build(&items);
    let vocab_ms = t0.elapsed().as_secs_f64() * 1_000.0;
    println!(
        "vocabulary: {:.1}ms categories={} repositories={} providers={}",
        vocab_ms,
        vocab.get(FacetName::Category).len(),
        vocab.get(FacetName::Repository).len(),
        vocab.get(FacetName::OperatorProvider).len()
    );

    let queries = [
        "Category=Database",
        "Category=Database,Security&Repository=repo1,repo2",
        "Provider=vendor3__%20Inc.",
        "Type=Charts&Search=app-0001",
        "Category=Unknown&Search=9",
    ];
    let filters: Vec<FilterState> = queries.iter().map(|q| query::decode(q)).collect();

    for (q, f) in queries.iter().zip(filters.iter()) {
        let mut times: Vec<u128> = Vec::with_capacity(20);
        let mut kept = 0usize;
        for _ in 0..20 {
            let t = Instant::now();
            let (hits, _dbg) = filter_items_with_debug(&items, f);
            times.push(t.elapsed().as_micros());
            kept = hits.len();
        }
        let p50 = percentile_us(&mut times.clone(), 0.50) as f64 / 1000.0;
        let p99 = percentile_us(&mut times, 0.99) as f64 / 1000.0;
        println!("{}: p50={:.3}ms p99={:.3}ms kept={}", q, p50, p99, kept);
    }
}
