//! Both access paths agree with native `i32` arithmetic and with each other,
//! sequentially and under concurrent load.

mod common;

use common::{connect, start_host, DIVISION_BY_ZERO};
use rand::{rngs::StdRng, Rng, SeedableRng};
use std::sync::Arc;

#[tokio::test]
async fn test_random_operands_match_native_arithmetic() {
    let host = start_host().await;
    let via_registry = connect(&host.registry_endpoint()).await;
    let direct = connect(&host.direct_endpoint()).await;
    let mut rng = StdRng::seed_from_u64(0x5eed);

    for _ in 0..200 {
        let a: i32 = rng.gen();
        let b: i32 = rng.gen();

        for client in [&via_registry, &direct] {
            assert_eq!(client.add(a, b).await.unwrap(), a.wrapping_add(b));
            assert_eq!(client.subtract(a, b).await.unwrap(), a.wrapping_sub(b));
            assert_eq!(client.multiply(a, b).await.unwrap(), a.wrapping_mul(b));
            match b {
                0 => {
                    let err = client.divide(a, b).await.unwrap_err();
                    assert_eq!(err.to_string(), DIVISION_BY_ZERO);
                }
                _ => assert_eq!(client.divide(a, b).await.unwrap(), a.wrapping_div(b)),
            }
        }
    }
}

#[tokio::test]
async fn test_boundary_values() {
    let host = start_host().await;
    let client = connect(&host.direct_endpoint()).await;

    assert_eq!(client.add(i32::MAX, 1).await.unwrap(), i32::MIN);
    assert_eq!(client.subtract(i32::MIN, 1).await.unwrap(), i32::MAX);
    assert_eq!(client.multiply(i32::MAX, 2).await.unwrap(), -2);
    assert_eq!(client.divide(i32::MIN, -1).await.unwrap(), i32::MIN);
    assert_eq!(client.divide(-7, 2).await.unwrap(), -3);
    assert_eq!(client.divide(7, -2).await.unwrap(), -3);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_calls_on_shared_clients() {
    let host = start_host().await;
    let via_registry = Arc::new(connect(&host.registry_endpoint()).await);
    let direct = Arc::new(connect(&host.direct_endpoint()).await);

    let mut handles = Vec::new();
    for i in 0..64i32 {
        let client = if i % 2 == 0 {
            via_registry.clone()
        } else {
            direct.clone()
        };
        handles.push(tokio::spawn(async move {
            for j in 0..10i32 {
                assert_eq!(client.add(i, j).await.unwrap(), i + j);
                assert_eq!(client.multiply(i, j).await.unwrap(), i * j);
                if j == 0 {
                    assert!(client.divide(i, j).await.unwrap_err().is_service());
                } else {
                    assert_eq!(client.divide(i * j, j).await.unwrap(), i);
                }
            }
        }));
    }

    for handle in handles {
        handle.await.unwrap();
    }
    host.shutdown().await.unwrap();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_many_independent_clients() {
    let host = start_host().await;
    let endpoint = host.registry_endpoint();

    let mut handles = Vec::new();
    for i in 0..16i32 {
        let endpoint = endpoint.clone();
        handles.push(tokio::spawn(async move {
            let client = connect(&endpoint).await;
            client.subtract(i * 10, i).await.unwrap()
        }));
    }

    for (i, handle) in handles.into_iter().enumerate() {
        assert_eq!(handle.await.unwrap(), i as i32 * 9);
    }
}
