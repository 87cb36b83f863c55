//! Reconciler (C7): two independent sweeps over a migration-tracking side
//! and its source regions. Neither mode touches the network in `Report`
//! mode — report-only is a hard non-mutation guarantee, not just a default.

use std::collections::BTreeSet;

use futures_util::StreamExt;

use crate::gateway::ObjectStoreClient;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DeletedAction {
    Report,
    Delete,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DuplicateAction {
    Report,
    Rename,
}

#[derive(Debug, Default)]
pub struct DeletedSweepReport {
    pub nonexistent_containers: Vec<String>,
    pub nonexistent_objects: Vec<(String, String)>,
    pub deleted_containers: Vec<String>,
    pub deleted_objects: Vec<(String, String)>,
    pub errors: Vec<String>,
}

/// `source_regions` lists `(region_name, client)` pairs probed in order;
/// the first region that reports the container is treated as its owner.
/// If more than one region claims the same container, the first match wins
/// and the collision is logged rather than silently masked.
pub async fn deleted_sweep(
    migration_side: &dyn ObjectStoreClient,
    source_regions: &[(&str, &dyn ObjectStoreClient)],
    action: DeletedAction,
) -> DeletedSweepReport {
    let mut report = DeletedSweepReport::default();

    let mut pages = migration_side.list_containers().await;
    let mut containers = Vec::new();
    while let Some(page) = pages.next().await {
        match page {
            Ok(batch) => containers.extend(batch),
            Err(e) => {
                report.errors.push(format!("listing migration-side containers failed: {e}"));
                break;
            }
        }
    }
    drop(pages);

    for container in containers {
        if container.is_segments_container() {
            continue;
        }

        let mut owner: Option<&dyn ObjectStoreClient> = None;
        for (region_name, client) in source_regions {
            match client.stat_container(&container.name).await {
                Ok(Some(_)) => {
                    if owner.is_none() {
                        owner = Some(*client);
                    } else {
                        tracing::warn!(
                            container = %container.name,
                            region = %region_name,
                            "container name claimed by more than one source region; keeping first match"
                        );
                    }
                }
                Ok(None) => {}
                Err(e) => report.errors.push(format!("probing {region_name} for {}: {e}", container.name)),
            }
        }

        let Some(owner) = owner else {
            report.nonexistent_containers.push(container.name.clone());
            if action == DeletedAction::Delete {
                match migration_side.delete_container(&container.name).await {
                    Ok(()) => report.deleted_containers.push(container.name.clone()),
                    Err(e) => report.errors.push(format!("deleting container {}: {e}", container.name)),
                }
            }
            continue;
        };

        let mut opages = migration_side.list_objects(&container.name).await;
        let mut objects = Vec::new();
        while let Some(page) = opages.next().await {
            match page {
                Ok(batch) => objects.extend(batch),
                Err(e) => {
                    report
                        .errors
                        .push(format!("listing objects in {}: {e}", container.name));
                    break;
                }
            }
        }
        drop(opages);

        let mut missing = Vec::new();
        for object in objects {
            match owner.stat_object(&container.name, &object.name).await {
                Ok(Some(_)) => {}
                Ok(None) => {
                    report.nonexistent_objects.push((container.name.clone(), object.name.clone()));
                    missing.push(object.name.clone());
                }
                Err(e) => report.errors.push(format!(
                    "probing source for {}/{}: {e}",
                    container.name, object.name
                )),
            }
        }

        if action == DeletedAction::Delete {
            for name in missing {
                match migration_side.delete_object(&container.name, &name).await {
                    Ok(()) => report.deleted_objects.push((container.name.clone(), name)),
                    Err(e) => report.errors.push(format!("deleting {}/{}: {e}", container.name, name)),
                }
            }
        }
    }

    report
}

#[derive(Debug, Default)]
pub struct DuplicateReport {
    pub duplicates: Vec<String>,
    pub renamed: Vec<(String, String, String)>,
    pub errors: Vec<String>,
}

/// `region_a`/`region_b` are `(suffix, client)` pairs for the same tenant in
/// two source regions. Renaming never deletes the original container —
/// codified as the defined (non-destructive) behavior.
pub async fn duplicate_collision(
    region_a: (&str, &dyn ObjectStoreClient),
    region_b: (&str, &dyn ObjectStoreClient),
    action: DuplicateAction,
) -> DuplicateReport {
    let mut report = DuplicateReport::default();

    let names_a = match list_container_names(region_a.1).await {
        Ok(n) => n,
        Err(e) => {
            report.errors.push(format!("listing containers in region {}: {e}", region_a.0));
            return report;
        }
    };
    let names_b = match list_container_names(region_b.1).await {
        Ok(n) => n,
        Err(e) => {
            report.errors.push(format!("listing containers in region {}: {e}", region_b.0));
            return report;
        }
    };

    let duplicates: BTreeSet<String> = names_a.intersection(&names_b).cloned().collect();
    report.duplicates = duplicates.iter().cloned().collect();

    if action != DuplicateAction::Rename {
        return report;
    }

    for name in &duplicates {
        let new_a = format!("{name}-{}", region_a.0);
        let new_b = format!("{name}-{}", region_b.0);
        if let Err(e) = rename_one_region(region_a.1, name, &new_a).await {
            report.errors.push(format!("renaming {name} in region {}: {e}", region_a.0));
            continue;
        }
        if let Err(e) = rename_one_region(region_b.1, name, &new_b).await {
            report.errors.push(format!("renaming {name} in region {}: {e}", region_b.0));
            continue;
        }
        report.renamed.push((name.clone(), new_a, new_b));
    }

    report
}

async fn list_container_names(client: &dyn ObjectStoreClient) -> anyhow::Result<BTreeSet<String>> {
    let mut pages = client.list_containers().await;
    let mut names = BTreeSet::new();
    while let Some(page) = pages.next().await {
        let batch = page.map_err(|e| anyhow::anyhow!(e.to_string()))?;
        names.extend(batch.into_iter().map(|c| c.name));
    }
    Ok(names)
}

/// Creates `new_name` (copying ACLs, unless it already exists) and
/// server-side-copies every object from `name` that isn't already present
/// under `new_name`. Does not touch `name` itself.
async fn rename_one_region(client: &dyn ObjectStoreClient, name: &str, new_name: &str) -> anyhow::Result<()> {
    if client
        .stat_container(new_name)
        .await
        .map_err(|e| anyhow::anyhow!(e.to_string()))?
        .is_none()
    {
        let original = client
            .stat_container(name)
            .await
            .map_err(|e| anyhow::anyhow!(e.to_string()))?;
        let mut headers = std::collections::BTreeMap::new();
        if let Some(c) = &original {
            if let Some(read) = &c.acl_read {
                headers.insert("x-container-read".to_string(), read.clone());
            }
            if let Some(write) = &c.acl_write {
                headers.insert("x-container-write".to_string(), write.clone());
            }
        }
        client
            .post_container(new_name, headers)
            .await
            .map_err(|e| anyhow::anyhow!(e.to_string()))?;
    }

    let mut pages = client.list_objects(name).await;
    let mut objects = Vec::new();
    while let Some(page) = pages.next().await {
        objects.extend(page.map_err(|e| anyhow::anyhow!(e.to_string()))?);
    }
    drop(pages);

    for object in objects {
        let already_there = client
            .stat_object(new_name, &object.name)
            .await
            .map_err(|e| anyhow::anyhow!(e.to_string()))?
            .is_some();
        if already_there {
            continue;
        }
        client
            .copy_object(name, &object.name, new_name, &object.name)
            .await
            .map_err(|e| anyhow::anyhow!(e.to_string()))?;
    }

    Ok(())
}
