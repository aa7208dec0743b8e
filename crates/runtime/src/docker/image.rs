//! Image domain — pull.

use super::client::{DockerClient, RuntimeError};
use futures_util::stream::StreamExt;

impl DockerClient {
    /// Pull an image from a registry. Returns when the pull is complete.
    /// A failed pull is fatal to the caller's start transition.
    pub async fn pull_image(&self, image: &str) -> Result<(), RuntimeError> {
        use bollard::query_parameters::CreateImageOptions;

        let (repo, tag) = split_image_ref(image);

        let options = Some(CreateImageOptions {
            from_image: Some(repo.to_string()),
            tag: Some(tag.to_string()),
            ..Default::default()
        });

        let mut stream = self.client.create_image(options, None, None);

        while let Some(result) = stream.next().await {
            match result {
                Ok(info) => {
                    tracing::debug!(status = ?info.status, "Image pull progress");
                }
                Err(e) => {
                    return Err(RuntimeError::PullFailed {
                        image: image.to_string(),
                        detail: e.to_string(),
                    });
                }
            }
        }

        Ok(())
    }
}

/// Split `repo[:tag]` into its parts, defaulting the tag to `latest`.
/// A colon inside a registry host port (`host:5000/img`) is not a tag
/// separator.
fn split_image_ref(image: &str) -> (&str, &str) {
    match image.rsplit_once(':') {
        Some((repo, tag)) if !tag.contains('/') => (repo, tag),
        _ => (image, "latest"),
    }
}

#[cfg(test)]
mod tests {
    use super::split_image_ref;

    #[test]
    fn plain_image_defaults_to_latest() {
        assert_eq!(split_image_ref("itzg/minecraft-server"), ("itzg/minecraft-server", "latest"));
    }

    #[test]
    fn explicit_tag_is_split() {
        assert_eq!(
            split_image_ref("itzg/minecraft-server:java21"),
            ("itzg/minecraft-server", "java21")
        );
    }

    #[test]
    fn registry_port_is_not_a_tag() {
        assert_eq!(
            split_image_ref("registry.local:5000/valheim"),
            ("registry.local:5000/valheim", "latest")
        );
    }
}
