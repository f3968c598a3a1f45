use std::collections::HashMap;
use std::convert::Infallible;

use async_trait::async_trait;
use stitchload::{BatchFunction, Loader};

// Empty functor that implements the BatchFunction trait. For this example, it
// trivially loads values from some HashMap.
struct MyBatchFn;

#[async_trait]
impl BatchFunction<i64, Option<String>> for MyBatchFn {
    type Context = HashMap<i64, String>;
    type Error = Infallible;

    async fn load(keys: &[i64], context: &Self::Context) -> Result<Vec<Option<String>>, Infallible> {
        Ok(keys.iter().map(|k| context.get(k).cloned()).collect())
    }
}

#[tokio::main]
async fn main() {
    let mut context = HashMap::new();
    context.insert(2001, "a space odyssey".to_owned());
    context.insert(7, "samurai".to_owned());
    context.insert(12, "angry men".to_owned());

    let loader = Loader::new(MyBatchFn {}, context);

    assert_eq!(loader.load(7).await.ok().flatten().as_deref(), Some("samurai"));
    assert_eq!(loader.load(15).await.ok().flatten(), None);

    assert_eq!(
        loader
            .load_many(vec![12, 2010, 2001])
            .await
            .into_iter()
            .map(|value| value.ok().flatten())
            .collect::<Vec<_>>(),
        vec![Some("angry men".to_owned()), None, Some("a space odyssey".to_owned())]
    );
}
