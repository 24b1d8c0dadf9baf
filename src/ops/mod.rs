pub mod color_removal;
pub mod compositor;
pub mod healing;
pub mod inpaint;
pub mod mask;
pub mod payload;
pub mod transform;
