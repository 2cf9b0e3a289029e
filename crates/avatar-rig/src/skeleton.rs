//! Bone arena with parent indices and top-down world transforms.

use glam::{Affine3A, Quat, Vec3};

use crate::error::{RigError, RigResult};
use crate::transform::Transform;

/// One joint of an imported skeleton.
#[derive(Debug, Clone)]
pub struct Bone {
    pub name: String,
    /// Index of the parent bone, `None` for roots.
    pub parent: Option<usize>,
    pub local: Transform,
    world: Affine3A,
    world_rotation: Quat,
}

impl Bone {
    #[must_use]
    pub fn new(name: impl Into<String>, parent: Option<usize>, local: Transform) -> Self {
        Self {
            name: name.into(),
            parent,
            local,
            world: Affine3A::IDENTITY,
            world_rotation: Quat::IDENTITY,
        }
    }
}

/// An arena of bones. World transforms are derived and only valid after
/// [`Skeleton::update_world`].
#[derive(Debug, Clone)]
pub struct Skeleton {
    bones: Vec<Bone>,
    children: Vec<Vec<usize>>,
    /// Parent-before-child traversal order.
    order: Vec<usize>,
}

impl Skeleton {
    /// Build a skeleton, validating parent links and computing world
    /// transforms for the bind pose.
    pub fn new(bones: Vec<Bone>) -> RigResult<Self> {
        let mut children = vec![Vec::new(); bones.len()];
        let mut roots = Vec::new();
        for (index, bone) in bones.iter().enumerate() {
            match bone.parent {
                Some(parent) if parent >= bones.len() || parent == index => {
                    return Err(RigError::InvalidParent { index, parent });
                }
                Some(parent) => children[parent].push(index),
                None => roots.push(index),
            }
        }

        let mut order = Vec::with_capacity(bones.len());
        let mut stack: Vec<usize> = roots.into_iter().rev().collect();
        while let Some(index) = stack.pop() {
            order.push(index);
            stack.extend(children[index].iter().rev());
        }
        if order.len() != bones.len() {
            return Err(RigError::Cycle);
        }

        let mut skeleton = Self {
            bones,
            children,
            order,
        };
        skeleton.update_world();
        Ok(skeleton)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.bones.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.bones.is_empty()
    }

    #[must_use]
    pub fn bones(&self) -> &[Bone] {
        &self.bones
    }

    #[must_use]
    pub fn bone(&self, index: usize) -> &Bone {
        &self.bones[index]
    }

    #[must_use]
    pub fn parent(&self, index: usize) -> Option<usize> {
        self.bones[index].parent
    }

    #[must_use]
    pub fn children(&self, index: usize) -> &[usize] {
        &self.children[index]
    }

    /// Bones without children.
    pub fn tails(&self) -> impl Iterator<Item = usize> + '_ {
        (0..self.bones.len()).filter(|&i| self.children[i].is_empty())
    }

    /// Parent-before-child traversal order.
    #[must_use]
    pub fn order(&self) -> &[usize] {
        &self.order
    }

    /// Find a bone by exact name.
    #[must_use]
    pub fn find(&self, name: &str) -> Option<usize> {
        self.bones.iter().position(|bone| bone.name == name)
    }

    /// True if `ancestor` lies on the parent chain of `index`.
    #[must_use]
    pub fn is_descendant_of(&self, index: usize, ancestor: usize) -> bool {
        let mut current = self.bones[index].parent;
        while let Some(parent) = current {
            if parent == ancestor {
                return true;
            }
            current = self.bones[parent].parent;
        }
        false
    }

    #[must_use]
    pub fn local(&self, index: usize) -> &Transform {
        &self.bones[index].local
    }

    /// Mutable local transform. Call [`Skeleton::update_world`] or
    /// [`Skeleton::update_subtree`] afterwards.
    pub fn local_mut(&mut self, index: usize) -> &mut Transform {
        &mut self.bones[index].local
    }

    #[must_use]
    pub fn world(&self, index: usize) -> Affine3A {
        self.bones[index].world
    }

    #[must_use]
    pub fn world_position(&self, index: usize) -> Vec3 {
        self.bones[index].world.translation.into()
    }

    #[must_use]
    pub fn world_rotation(&self, index: usize) -> Quat {
        self.bones[index].world_rotation
    }

    /// Recompute every world transform top-down.
    pub fn update_world(&mut self) {
        for i in 0..self.order.len() {
            let index = self.order[i];
            self.refresh(index);
        }
    }

    /// Recompute world transforms for `index` and all of its descendants.
    pub fn update_subtree(&mut self, index: usize) {
        let mut stack = vec![index];
        while let Some(current) = stack.pop() {
            self.refresh(current);
            stack.extend(self.children[current].iter().copied());
        }
    }

    fn refresh(&mut self, index: usize) {
        let (parent_world, parent_rotation) = self.bones[index]
            .parent
            .map_or((Affine3A::IDENTITY, Quat::IDENTITY), |p| {
                (self.bones[p].world, self.bones[p].world_rotation)
            });
        let bone = &mut self.bones[index];
        bone.world = parent_world * bone.local.to_affine();
        bone.world_rotation = (parent_rotation * bone.local.rotation).normalize();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chain() -> Skeleton {
        Skeleton::new(vec![
            Bone::new("root", None, Transform::from_translation(Vec3::Y)),
            Bone::new(
                "mid",
                Some(0),
                Transform::from_translation(Vec3::X)
                    .with_rotation(Quat::from_rotation_z(std::f32::consts::FRAC_PI_2)),
            ),
            Bone::new("tip", Some(1), Transform::from_translation(Vec3::X)),
        ])
        .unwrap()
    }

    #[test]
    fn world_transforms_compose_top_down() {
        let skeleton = chain();
        assert!(skeleton.world_position(1).abs_diff_eq(Vec3::new(1.0, 1.0, 0.0), 1e-6));
        // The mid rotation turns the tip's +X offset into +Y.
        assert!(skeleton.world_position(2).abs_diff_eq(Vec3::new(1.0, 2.0, 0.0), 1e-6));
    }

    #[test]
    fn subtree_update_only_touches_descendants() {
        let mut skeleton = chain();
        skeleton.local_mut(1).rotation = Quat::IDENTITY;
        skeleton.update_subtree(1);
        assert!(skeleton.world_position(2).abs_diff_eq(Vec3::new(2.0, 1.0, 0.0), 1e-6));
    }

    #[test]
    fn rejects_cycles_and_bad_parents() {
        let cyclic = Skeleton::new(vec![
            Bone::new("a", Some(1), Transform::IDENTITY),
            Bone::new("b", Some(0), Transform::IDENTITY),
        ]);
        assert!(matches!(cyclic, Err(RigError::Cycle)));

        let dangling = Skeleton::new(vec![Bone::new("a", Some(4), Transform::IDENTITY)]);
        assert!(matches!(dangling, Err(RigError::InvalidParent { index: 0, parent: 4 })));
    }

    #[test]
    fn parents_visit_before_children() {
        let skeleton = Skeleton::new(vec![
            Bone::new("child", Some(1), Transform::IDENTITY),
            Bone::new("root", None, Transform::IDENTITY),
        ])
        .unwrap();
        assert_eq!(skeleton.order(), &[1, 0]);
        assert!(skeleton.is_descendant_of(0, 1));
        assert_eq!(skeleton.tails().collect::<Vec<_>>(), vec![0]);
    }
}
