use super::native::{VkDeviceQueueCreateInfo, VkQueueFamilyDesc, VkQueueFlags};
use crate::{PrismError, PrismQueueType, PrismResult};

const GRAPHICS_QUEUE_PRIORITY: f32 = 0.5;
// Async compute is latency sensitive so it gets the highest priority
const COMPUTE_QUEUE_PRIORITY: f32 = 1.0;
const TRANSFER_QUEUE_PRIORITY: f32 = 0.5;

/// A queue chosen for one of the roles. Roles that could not get their own queue share the
/// assignment of another role.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct VkQueueAssignment {
    pub queue_family_index: u32,
    pub queue_index: u32,
    pub priority: f32,
}

/// Tracks how many queues of each family have been handed out so far
struct QueueFamilyUsage<'a> {
    queue_families: &'a [VkQueueFamilyDesc],
    // Index is the queue family, one priority per assigned queue
    priorities: Vec<Vec<f32>>,
}

impl<'a> QueueFamilyUsage<'a> {
    fn new(queue_families: &'a [VkQueueFamilyDesc]) -> Self {
        QueueFamilyUsage {
            queue_families,
            priorities: vec![Vec::default(); queue_families.len()],
        }
    }

    fn remaining(
        &self,
        queue_family_index: usize,
    ) -> u32 {
        let used = self.priorities[queue_family_index].len() as u32;
        self.queue_families[queue_family_index]
            .queue_count
            .saturating_sub(used)
    }

    /// Claims a queue in the first family that has all `required` flags, none of the `ignored`
    /// flags and at least one queue left
    fn claim(
        &mut self,
        required: VkQueueFlags,
        ignored: VkQueueFlags,
        priority: f32,
    ) -> Option<VkQueueAssignment> {
        for (queue_family_index, queue_family) in self.queue_families.iter().enumerate() {
            if !queue_family.queue_flags.contains(required)
                || queue_family.queue_flags.intersects(ignored)
            {
                continue;
            }

            if self.remaining(queue_family_index) == 0 {
                continue;
            }

            let priorities = &mut self.priorities[queue_family_index];
            let queue_index = priorities.len() as u32;
            priorities.push(priority);

            return Some(VkQueueAssignment {
                queue_family_index: queue_family_index as u32,
                queue_index,
                priority,
            });
        }

        None
    }

    fn queue_create_infos(&self) -> Vec<VkDeviceQueueCreateInfo> {
        self.priorities
            .iter()
            .enumerate()
            .filter(|(_, priorities)| !priorities.is_empty())
            .map(|(queue_family_index, priorities)| VkDeviceQueueCreateInfo {
                queue_family_index: queue_family_index as u32,
                queue_priorities: priorities.clone(),
            })
            .collect()
    }
}

/// Assignment of the graphics, compute and transfer roles to hardware queues, along with the
/// queue create infos needed to create them
#[derive(Clone, Debug, PartialEq)]
pub struct VkQueueAllocation {
    pub graphics: VkQueueAssignment,
    pub compute: VkQueueAssignment,
    pub transfer: VkQueueAssignment,
    /// One entry per family with at least one assigned queue, in family order
    pub queue_create_infos: Vec<VkDeviceQueueCreateInfo>,
}

impl VkQueueAllocation {
    pub fn allocate(queue_families: &[VkQueueFamilyDesc]) -> PrismResult<Self> {
        log::debug!("Queue families: {:?}", queue_families);

        let mut usage = QueueFamilyUsage::new(queue_families);

        let graphics = usage
            .claim(
                VkQueueFlags::GRAPHICS | VkQueueFlags::COMPUTE,
                VkQueueFlags::empty(),
                GRAPHICS_QUEUE_PRIORITY,
            )
            .ok_or_else(|| {
                PrismError::NoCompatibleAdapter(
                    "The physical device has no queue family that supports graphics and compute"
                        .to_string(),
                )
            })?;

        let compute = usage
            .claim(
                VkQueueFlags::GRAPHICS | VkQueueFlags::COMPUTE,
                VkQueueFlags::empty(),
                COMPUTE_QUEUE_PRIORITY,
            )
            .or_else(|| {
                usage.claim(
                    VkQueueFlags::COMPUTE,
                    VkQueueFlags::empty(),
                    COMPUTE_QUEUE_PRIORITY,
                )
            })
            .unwrap_or(graphics);

        let transfer = usage
            .claim(
                VkQueueFlags::TRANSFER,
                VkQueueFlags::GRAPHICS | VkQueueFlags::COMPUTE,
                TRANSFER_QUEUE_PRIORITY,
            )
            .or_else(|| {
                usage.claim(
                    VkQueueFlags::COMPUTE,
                    VkQueueFlags::GRAPHICS,
                    TRANSFER_QUEUE_PRIORITY,
                )
            })
            .unwrap_or(compute);

        let queue_create_infos = usage.queue_create_infos();

        log::debug!("Graphics queue: {:?}", graphics);
        log::debug!("Compute queue: {:?}", compute);
        log::debug!("Transfer queue: {:?}", transfer);
        log::debug!("Queue create infos: {:?}", queue_create_infos);

        Ok(VkQueueAllocation {
            graphics,
            compute,
            transfer,
            queue_create_infos,
        })
    }

    pub fn assignment(
        &self,
        queue_type: PrismQueueType,
    ) -> &VkQueueAssignment {
        match queue_type {
            PrismQueueType::Graphics => &self.graphics,
            PrismQueueType::Compute => &self.compute,
            PrismQueueType::Transfer => &self.transfer,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn family(
        queue_flags: VkQueueFlags,
        queue_count: u32,
    ) -> VkQueueFamilyDesc {
        VkQueueFamilyDesc {
            queue_flags,
            queue_count,
        }
    }

    #[test]
    fn test_single_family_collapses_all_roles() {
        let families = [family(VkQueueFlags::all(), 1)];
        let allocation = VkQueueAllocation::allocate(&families).unwrap();

        let expected = VkQueueAssignment {
            queue_family_index: 0,
            queue_index: 0,
            priority: 0.5,
        };
        assert_eq!(allocation.graphics, expected);
        assert_eq!(allocation.compute, expected);
        assert_eq!(allocation.transfer, expected);
        assert_eq!(
            allocation.queue_create_infos,
            vec![VkDeviceQueueCreateInfo {
                queue_family_index: 0,
                queue_priorities: vec![0.5],
            }]
        );
    }

    #[test]
    fn test_no_graphics_family_fails() {
        let families = [
            family(VkQueueFlags::COMPUTE | VkQueueFlags::TRANSFER, 4),
            family(VkQueueFlags::TRANSFER, 2),
        ];
        match VkQueueAllocation::allocate(&families) {
            Err(PrismError::NoCompatibleAdapter(_)) => {}
            other => panic!("unexpected result {:?}", other),
        }
    }

    #[test]
    fn test_dedicated_families() {
        // Typical discrete GPU layout
        let families = [
            family(
                VkQueueFlags::GRAPHICS | VkQueueFlags::COMPUTE | VkQueueFlags::TRANSFER,
                1,
            ),
            family(VkQueueFlags::TRANSFER | VkQueueFlags::SPARSE_BINDING, 2),
            family(VkQueueFlags::COMPUTE | VkQueueFlags::TRANSFER, 8),
        ];
        let allocation = VkQueueAllocation::allocate(&families).unwrap();

        assert_eq!(allocation.graphics.queue_family_index, 0);
        assert_eq!(allocation.compute.queue_family_index, 2);
        assert_eq!(allocation.compute.priority, 1.0);
        assert_eq!(allocation.transfer.queue_family_index, 1);
        assert_eq!(allocation.transfer.queue_index, 0);

        let families_in_order: Vec<u32> = allocation
            .queue_create_infos
            .iter()
            .map(|x| x.queue_family_index)
            .collect();
        assert_eq!(families_in_order, vec![0, 1, 2]);
    }

    #[test]
    fn test_queues_in_one_family_are_compacted() {
        let families = [family(
            VkQueueFlags::GRAPHICS | VkQueueFlags::COMPUTE | VkQueueFlags::TRANSFER,
            16,
        )];
        let allocation = VkQueueAllocation::allocate(&families).unwrap();

        // Compute gets a second queue in the graphics family, transfer has no dedicated family
        // and shares compute
        assert_eq!(allocation.graphics.queue_index, 0);
        assert_eq!(allocation.compute.queue_family_index, 0);
        assert_eq!(allocation.compute.queue_index, 1);
        assert_eq!(allocation.transfer, allocation.compute);
        assert_eq!(
            allocation.queue_create_infos,
            vec![VkDeviceQueueCreateInfo {
                queue_family_index: 0,
                queue_priorities: vec![0.5, 1.0],
            }]
        );
    }

    #[test]
    fn test_transfer_falls_back_to_compute_only_family() {
        let families = [
            family(VkQueueFlags::GRAPHICS | VkQueueFlags::COMPUTE, 1),
            family(VkQueueFlags::COMPUTE | VkQueueFlags::TRANSFER, 2),
        ];
        let allocation = VkQueueAllocation::allocate(&families).unwrap();

        assert_eq!(allocation.compute.queue_family_index, 1);
        assert_eq!(allocation.compute.queue_index, 0);
        assert_eq!(allocation.transfer.queue_family_index, 1);
        assert_eq!(allocation.transfer.queue_index, 1);
        assert_eq!(allocation.transfer.priority, 0.5);
        assert_eq!(
            allocation.queue_create_infos[1].queue_priorities,
            vec![1.0, 0.5]
        );
        assert_eq!(
            *allocation.assignment(PrismQueueType::Transfer),
            allocation.transfer
        );
    }
}
