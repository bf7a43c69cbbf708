//! Backfill of remote identities onto stored children
//!
//! After the remote side accepts an add or update it answers with the
//! identities it assigned to new children. These updaters copy them onto the
//! local and synchronized child rows that still lack one.

use crate::context::Context;
use crate::error::Result;
use crate::models::{DynamicField, Item};

pub trait ExternalIdUpdater<T> {
    /// Copy external ids from `remote` onto `targets`. Returns how many
    /// targets received one.
    fn update_external_ids(
        &self,
        context: &mut Context,
        targets: Vec<&mut T>,
        remote: &[T],
    ) -> Result<usize>;
}

/// Items are matched by relative path.
#[derive(Debug, Clone, Copy, Default)]
pub struct ItemExternalIdUpdater;

impl ExternalIdUpdater<Item> for ItemExternalIdUpdater {
    fn update_external_ids(
        &self,
        context: &mut Context,
        targets: Vec<&mut Item>,
        remote: &[Item],
    ) -> Result<usize> {
        let mut updated = 0;
        for target in targets {
            let Some(external_id) = remote
                .iter()
                .find(|item| item.same_path(target))
                .and_then(|item| item.external_id.clone())
            else {
                continue;
            };
            if target.external_id.as_deref() == Some(external_id.as_str()) {
                continue;
            }
            target.external_id = Some(external_id);
            if target.id != 0 {
                context.update(target)?;
            }
            updated += 1;
        }
        Ok(updated)
    }
}

/// Fields are matched by name and kind, positionally among equal slots,
/// nested fields first.
#[derive(Debug, Clone, Copy, Default)]
pub struct DynamicFieldExternalIdUpdater;

impl ExternalIdUpdater<DynamicField> for DynamicFieldExternalIdUpdater {
    fn update_external_ids(
        &self,
        context: &mut Context,
        targets: Vec<&mut DynamicField>,
        remote: &[DynamicField],
    ) -> Result<usize> {
        let mut updated = 0;
        let mut used = vec![false; remote.len()];

        for target in targets {
            let Some(index) = (0..remote.len()).find(|&index| !used[index] && remote[index].same_slot(target))
            else {
                continue;
            };
            used[index] = true;
            let source = &remote[index];

            if let (Some(children), Some(remote_children)) =
                (target.children.as_mut(), source.children.as_deref())
            {
                updated += self.update_external_ids(context, children.iter_mut().collect(), remote_children)?;
            }

            if target.external_id.is_none() && source.external_id.is_some() {
                target.external_id.clone_from(&source.external_id);
                if target.id != 0 {
                    let mut row = target.clone();
                    row.children = None;
                    context.update(&mut row)?;
                }
                updated += 1;
            }
        }
        Ok(updated)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::FieldValue;
    use pretty_assertions::assert_eq;

    #[test]
    fn items_receive_ids_by_path() {
        let mut context = Context::new();
        let mut stored = Item::new("/a.txt");
        context.add(&mut stored);
        let mut fresh = Item::new("/b.txt");

        let mut remote_a = Item::new("/a.txt");
        remote_a.external_id = Some("ext-1".into());
        let mut remote_b = Item::new("/b.txt");
        remote_b.external_id = Some("ext-2".into());

        let updated = ItemExternalIdUpdater
            .update_external_ids(&mut context, vec![&mut stored, &mut fresh], &[remote_a, remote_b])
            .unwrap();
        assert_eq!(updated, 2);
        assert_eq!(
            context.get::<Item>(stored.id).unwrap().external_id.as_deref(),
            Some("ext-1")
        );
        assert_eq!(fresh.external_id.as_deref(), Some("ext-2"));
    }

    #[test]
    fn fields_match_positionally_and_recurse() {
        let mut context = Context::new();
        let mut first = DynamicField::new("Note", FieldValue::String("a".into()));
        let mut second = DynamicField::new("Note", FieldValue::String("b".into()));
        let mut location = DynamicField::new("Location", FieldValue::Object);
        location.children = Some(vec![DynamicField::new("Floor", FieldValue::Integer(1))]);
        context.add(&mut location);

        let mut remote_first = first.clone();
        remote_first.external_id = Some("ext-1".into());
        let mut remote_second = second.clone();
        remote_second.external_id = Some("ext-2".into());
        let mut remote_location = location.clone();
        remote_location.external_id = Some("ext-3".into());
        let mut remote_floor = DynamicField::new("Floor", FieldValue::Integer(1));
        remote_floor.external_id = Some("ext-4".into());
        remote_location.children = Some(vec![remote_floor]);

        let updated = DynamicFieldExternalIdUpdater
            .update_external_ids(
                &mut context,
                vec![&mut first, &mut second, &mut location],
                &[remote_first, remote_second, remote_location],
            )
            .unwrap();
        assert_eq!(updated, 4);
        assert_eq!(first.external_id.as_deref(), Some("ext-1"));
        assert_eq!(second.external_id.as_deref(), Some("ext-2"));
        let floor = &location.children.as_ref().unwrap()[0];
        assert_eq!(floor.external_id.as_deref(), Some("ext-4"));
        assert_eq!(
            context.get::<DynamicField>(location.id).unwrap().external_id.as_deref(),
            Some("ext-3")
        );
    }
}
