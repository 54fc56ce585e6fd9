//! Arrays indexed by swapchain image
//!
//! Framebuffers, command buffers, uniform buffers and descriptor sets are
//! parallel arrays over the swapchain images: the index returned by acquire
//! selects the same slot in each. `PerImage` keeps that index space explicit
//! and turns an out-of-range index into an error instead of a panic.

use crate::vulkan::{VulkanError, VulkanResult};

/// One `T` per swapchain image
#[derive(Debug, Clone)]
pub struct PerImage<T> {
    items: Vec<T>,
}

impl<T> PerImage<T> {
    /// Wrap an existing vector, one entry per image
    pub fn new(items: Vec<T>) -> Self {
        Self { items }
    }

    /// Build `count` entries, stopping at the first error
    pub fn try_from_fn<F>(count: usize, mut create: F) -> VulkanResult<Self>
    where
        F: FnMut(usize) -> VulkanResult<T>,
    {
        let items = (0..count).map(&mut create).collect::<VulkanResult<Vec<_>>>()?;
        Ok(Self { items })
    }

    /// Entry for `image_index`
    pub fn get(&self, image_index: u32) -> VulkanResult<&T> {
        let len = self.items.len();
        self.items.get(image_index as usize).ok_or_else(|| out_of_range(image_index, len))
    }

    /// Mutable entry for `image_index`
    pub fn get_mut(&mut self, image_index: u32) -> VulkanResult<&mut T> {
        let len = self.items.len();
        self.items.get_mut(image_index as usize).ok_or_else(|| out_of_range(image_index, len))
    }

    /// Number of images covered
    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// True when no images are covered
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Entries in image order
    pub fn iter(&self) -> std::slice::Iter<'_, T> {
        self.items.iter()
    }

    /// Entries with their image index
    pub fn enumerate(&self) -> impl Iterator<Item = (u32, &T)> {
        self.items.iter().enumerate().map(|(i, item)| (i as u32, item))
    }

    /// Fail unless `other` covers the same number of images
    pub fn ensure_parallel<U>(&self, other: &PerImage<U>, what: &str) -> VulkanResult<()> {
        if self.len() == other.len() {
            Ok(())
        } else {
            Err(VulkanError::invalid(format!(
                "{} covers {} images, expected {}",
                what,
                other.len(),
                self.len()
            )))
        }
    }

    /// Map each entry, keeping the index space
    pub fn map<U, F: FnMut(&T) -> U>(&self, f: F) -> PerImage<U> {
        PerImage {
            items: self.items.iter().map(f).collect(),
        }
    }
}

impl<T> IntoIterator for PerImage<T> {
    type Item = T;
    type IntoIter = std::vec::IntoIter<T>;

    fn into_iter(self) -> Self::IntoIter {
        self.items.into_iter()
    }
}

fn out_of_range(image_index: u32, len: usize) -> VulkanError {
    VulkanError::invalid(format!("image index {} out of range for {} swapchain images", image_index, len))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_index_selects_matching_entries() {
        let command_buffers = PerImage::new(vec!["cb0", "cb1", "cb2"]);
        let descriptor_sets = PerImage::try_from_fn(3, |i| Ok(format!("set{}", i))).unwrap();
        let uniforms = command_buffers.map(|cb| cb.replace("cb", "ubo"));

        command_buffers.ensure_parallel(&descriptor_sets, "descriptor sets").unwrap();
        command_buffers.ensure_parallel(&uniforms, "uniform buffers").unwrap();

        for image_index in 0..3 {
            assert_eq!(*command_buffers.get(image_index).unwrap(), format!("cb{}", image_index));
            assert_eq!(*descriptor_sets.get(image_index).unwrap(), format!("set{}", image_index));
            assert_eq!(*uniforms.get(image_index).unwrap(), format!("ubo{}", image_index));
        }
    }

    #[test]
    fn test_out_of_range_is_error() {
        let mut items = PerImage::new(vec![1, 2]);
        assert!(matches!(items.get(2), Err(VulkanError::InvalidOperation { .. })));
        assert!(items.get_mut(5).is_err());
        *items.get_mut(1).unwrap() = 7;
        assert_eq!(*items.get(1).unwrap(), 7);
    }

    #[test]
    fn test_length_mismatch_detected() {
        let a = PerImage::new(vec![0; 3]);
        let b = PerImage::new(vec![0; 2]);
        assert!(a.ensure_parallel(&b, "framebuffers").is_err());
    }

    #[test]
    fn test_try_from_fn_stops_on_error() {
        let mut calls = 0;
        let result: VulkanResult<PerImage<u32>> = PerImage::try_from_fn(4, |i| {
            calls += 1;
            if i == 1 {
                Err(VulkanError::invalid("boom"))
            } else {
                Ok(i as u32)
            }
        });
        assert!(result.is_err());
        assert_eq!(calls, 2);
    }

    #[test]
    fn test_enumerate_yields_image_indices() {
        let items = PerImage::new(vec!['a', 'b']);
        let pairs: Vec<_> = items.enumerate().collect();
        assert_eq!(pairs, vec![(0, &'a'), (1, &'b')]);
    }
}
