extern crate rand;

use rand::Rng;

const CHARSET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ\
                            abcdefghijklmnopqrstuvwxyz\
                            0123456789";

/// Random alphanumeric string, used to tag broker consumers
pub fn create_random_secret(secret_len: usize) -> String {
    let mut rng = rand::thread_rng();

    (0..secret_len)
        .map(|_| {
            let idx = rng.gen_range(0..CHARSET.len());
            CHARSET[idx] as char
        })
        .collect()
}

/// Random delay in `[0, max_millis)`. Zero when `max_millis` is zero.
pub fn random_jitter_millis(max_millis: u64) -> u64 {
    if max_millis == 0 {
        return 0;
    }
    rand::thread_rng().gen_range(0..max_millis)
}
